use serde::Serialize;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use super::domain::LatenessEvent;

/// Text printed on the thermal receipt handed to a late student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub title: String,
    pub lines: Vec<String>,
}

impl Receipt {
    pub fn for_lateness(event: &LatenessEvent, count: u32) -> Self {
        let status = if event.justified {
            "Justified lateness".to_string()
        } else {
            format!("Lateness count: {count}")
        };

        Self {
            title: "LATENESS".to_string(),
            lines: vec![
                format!(
                    "{} {}",
                    fold_ascii(&event.student.last_name),
                    fold_ascii(&event.student.first_name)
                ),
                event.student.classe.compact(),
                event.created_at.format("%H:%M - %d/%m/%Y").to_string(),
                status,
                "Have a nice day!".to_string(),
            ],
        }
    }

    pub fn render(&self) -> String {
        let mut text = format!("{}\n", self.title);
        for line in &self.lines {
            text.push('\n');
            text.push_str(line);
        }
        text
    }
}

/// Receipt printers only handle a US code page.
pub fn fold_ascii(value: &str) -> String {
    value
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c.is_ascii() { c } else { '?' })
        .collect()
}

/// Printer abstraction; drivers live outside this crate.
pub trait ReceiptPrinter: Send + Sync {
    fn print_receipt(&self, address: &str, receipt: &Receipt) -> Result<(), PrinterError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PrinterError {
    #[error("printer {address} unreachable")]
    Unreachable {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("printer io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_accents_to_ascii() {
        assert_eq!(fold_ascii("Lemaître"), "Lemaitre");
        assert_eq!(fold_ascii("Zoé Ødegård"), "Zoe ?degard");
    }
}
