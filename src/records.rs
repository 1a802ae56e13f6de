use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sentinel {
    NotFound,
    FolderNotFound,
    ProcessingError,
}

impl Sentinel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentinel::NotFound => "NOT_FOUND",
            Sentinel::FolderNotFound => "FOLDER_NOT_FOUND",
            Sentinel::ProcessingError => "PROCESSING_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CardValue {
    Number(String),
    Sentinel(Sentinel),
}

impl fmt::Display for CardValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardValue::Number(number) => f.write_str(number),
            CardValue::Sentinel(sentinel) => f.write_str(sentinel.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActualResult {
    pub card: CardValue,
    pub valid: bool,
}

impl ActualResult {
    pub fn number(number: impl Into<String>, valid: bool) -> Self {
        Self {
            card: CardValue::Number(number.into()),
            valid,
        }
    }

    /// Sentinels always fail validation.
    pub fn sentinel(sentinel: Sentinel) -> Self {
        Self {
            card: CardValue::Sentinel(sentinel),
            valid: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRecord {
    row: usize,
    customer_name: String,
    expected_filename: String,
    expected_card_number: String,
    expected_validation: String,
    actual: Option<ActualResult>,
}

impl CustomerRecord {
    pub fn new(
        row: usize,
        customer_name: impl Into<String>,
        expected_filename: impl Into<String>,
        expected_card_number: impl Into<String>,
        expected_validation: impl Into<String>,
    ) -> Self {
        Self {
            row,
            customer_name: customer_name.into(),
            expected_filename: expected_filename.into(),
            expected_card_number: expected_card_number.into(),
            expected_validation: expected_validation.into(),
            actual: None,
        }
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn customer_name(&self) -> &str {
        &self.customer_name
    }

    pub fn expected_filename(&self) -> &str {
        &self.expected_filename
    }

    pub fn expected_card_number(&self) -> &str {
        &self.expected_card_number
    }

    pub fn expected_validation(&self) -> &str {
        &self.expected_validation
    }

    pub fn actual(&self) -> Option<&ActualResult> {
        self.actual.as_ref()
    }

    pub fn is_filled(&self) -> bool {
        self.actual.is_some()
    }

    /// Returns the previous value when one is replaced.
    pub fn set_actual(&mut self, result: ActualResult) -> Option<ActualResult> {
        self.actual.replace(result)
    }
}
