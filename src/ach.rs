//! Minimal NACHA ACH file model and parser.
//!
//! Stands in for the external ACH parsing library the rest of the pipeline
//! treats as a black box (`spec.md` §3): nothing outside this module should
//! know or care how bytes became an [`AchFile`]. Only the subset of the NACHA
//! format the pipeline actually inspects is modeled — record types 1 (file
//! header), 5 (batch header), 6 (entry detail), 7 (addenda), 8 (batch
//! control), 9 (file control). Anything else is rejected with
//! [`AchParseError::UnknownRecordType`].

use crate::error::AchParseError;
use serde::Serialize;

pub const RECORD_LEN: usize = 94;

/// Transaction codes relevant to classification. Only the subset the
/// pipeline distinguishes is named; any other code round-trips as
/// `TransactionCode::Other(u16)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransactionCode {
    CheckingCredit,
    CheckingPrenoteCredit,
    CheckingDebit,
    CheckingPrenoteDebit,
    SavingsCredit,
    SavingsPrenoteCredit,
    SavingsDebit,
    SavingsPrenoteDebit,
    GLCredit,
    GLPrenoteCredit,
    GLDebit,
    GLPrenoteDebit,
    LoanCredit,
    LoanPrenoteCredit,
    Other(u16),
}

impl TransactionCode {
    pub fn from_code(code: u16) -> Self {
        match code {
            22 => Self::CheckingCredit,
            23 => Self::CheckingPrenoteCredit,
            27 => Self::CheckingDebit,
            28 => Self::CheckingPrenoteDebit,
            32 => Self::SavingsCredit,
            33 => Self::SavingsPrenoteCredit,
            37 => Self::SavingsDebit,
            38 => Self::SavingsPrenoteDebit,
            42 => Self::GLCredit,
            43 => Self::GLPrenoteCredit,
            47 => Self::GLDebit,
            48 => Self::GLPrenoteDebit,
            52 => Self::LoanCredit,
            53 => Self::LoanPrenoteCredit,
            other => Self::Other(other),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            Self::CheckingCredit => 22,
            Self::CheckingPrenoteCredit => 23,
            Self::CheckingDebit => 27,
            Self::CheckingPrenoteDebit => 28,
            Self::SavingsCredit => 32,
            Self::SavingsPrenoteCredit => 33,
            Self::SavingsDebit => 37,
            Self::SavingsPrenoteDebit => 38,
            Self::GLCredit => 42,
            Self::GLPrenoteCredit => 43,
            Self::GLDebit => 47,
            Self::GLPrenoteDebit => 48,
            Self::LoanCredit => 52,
            Self::LoanPrenoteCredit => 53,
            Self::Other(c) => *c,
        }
    }

    /// The fixed prenote code set from spec.md §4.5. Note LoanPrenoteDebit is
    /// deliberately absent — the spec names only `LoanPrenoteCredit`.
    pub fn is_prenote(&self) -> bool {
        matches!(
            self,
            Self::CheckingPrenoteCredit
                | Self::CheckingPrenoteDebit
                | Self::SavingsPrenoteCredit
                | Self::SavingsPrenoteDebit
                | Self::GLPrenoteCredit
                | Self::GLPrenoteDebit
                | Self::LoanPrenoteCredit
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileHeader {
    pub immediate_origin: String,
    pub immediate_destination: String,
    pub file_creation_date: String,
    pub file_creation_time: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileControl {
    pub batch_count: usize,
    pub entry_count: usize,
    pub total_debit_entry_dollar_amount_in_file: i64,
    pub total_credit_entry_dollar_amount_in_file: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryDetail {
    pub transaction_code: TransactionCode,
    pub amount: i64,
    pub trace_number: String,
    pub addenda: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchHeader {
    pub company_name: String,
    pub standard_entry_class: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    pub header: BatchHeader,
    pub entries: Vec<EntryDetail>,
}

impl Batch {
    pub fn entries(&self) -> &[EntryDetail] {
        &self.entries
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AchFile {
    pub header: FileHeader,
    pub batches: Vec<Batch>,
    pub control: FileControl,
}

impl AchFile {
    pub fn entry_count(&self) -> usize {
        self.batches.iter().map(|b| b.entries.len()).sum()
    }
}

/// Strict parse: every batch must carry its own header record.
pub fn parse(bytes: &[u8]) -> Result<AchFile, AchParseError> {
    parse_inner(bytes, false)
}

/// Relaxed parse: tolerates a batch with no leading header record by
/// synthesizing an empty one, per `Inbound.AllowMissingBatchHeader`.
pub fn parse_relaxed(bytes: &[u8]) -> Result<AchFile, AchParseError> {
    parse_inner(bytes, true)
}

fn parse_inner(bytes: &[u8], allow_missing_batch_header: bool) -> Result<AchFile, AchParseError> {
    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.is_empty())
        .collect();

    if lines.is_empty() {
        return Err(AchParseError::Empty);
    }

    let mut header: Option<FileHeader> = None;
    let mut control: Option<FileControl> = None;
    let mut batches: Vec<Batch> = Vec::new();
    let mut current: Option<Batch> = None;

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        if line.len() != RECORD_LEN {
            return Err(AchParseError::BadRecordLength {
                line: line_no,
                len: line.len(),
            });
        }
        let record_type = line.chars().next().unwrap();
        match record_type {
            '1' => {
                header = Some(FileHeader {
                    immediate_destination: field(line, 4, 13),
                    immediate_origin: field(line, 14, 23),
                    file_creation_date: field(line, 24, 29),
                    file_creation_time: field(line, 30, 33),
                });
            }
            '5' => {
                if let Some(batch) = current.take() {
                    batches.push(batch);
                }
                current = Some(Batch {
                    header: BatchHeader {
                        company_name: field(line, 5, 20),
                        standard_entry_class: field(line, 51, 53),
                    },
                    entries: Vec::new(),
                });
            }
            '6' => {
                let code: u16 = parse_u16(line, 1, 3, line_no, "transactionCode")?;
                let amount: i64 = parse_i64(line, 29, 39, line_no, "amount")?;
                let trace_number = field(line, 79, 94);
                let entry = EntryDetail {
                    transaction_code: TransactionCode::from_code(code),
                    amount,
                    trace_number,
                    addenda: Vec::new(),
                };
                match current.as_mut() {
                    Some(batch) => batch.entries.push(entry),
                    None => {
                        if allow_missing_batch_header {
                            current = Some(Batch {
                                header: BatchHeader::default(),
                                entries: vec![entry],
                            });
                        } else {
                            return Err(AchParseError::MissingBatchHeader(line_no));
                        }
                    }
                }
            }
            '7' => {
                let addendum = field(line, 3, 83);
                if let Some(batch) = current.as_mut() {
                    if let Some(last) = batch.entries.last_mut() {
                        last.addenda.push(addendum);
                    }
                }
            }
            '8' => {
                // Batch control: nothing in this batch is consumed downstream
                // beyond what's already on the entries themselves.
                if let Some(batch) = current.take() {
                    batches.push(batch);
                }
            }
            '9' => {
                control = Some(FileControl {
                    batch_count: parse_usize(line, 1, 7, line_no, "batchCount")?,
                    entry_count: parse_usize(line, 13, 21, line_no, "entryAddendaCount")?,
                    total_debit_entry_dollar_amount_in_file: parse_i64(
                        line, 31, 43, line_no, "totalDebit",
                    )?,
                    total_credit_entry_dollar_amount_in_file: parse_i64(
                        line, 43, 55, line_no, "totalCredit",
                    )?,
                });
            }
            other => return Err(AchParseError::UnknownRecordType(line_no, other)),
        }
    }

    if let Some(batch) = current.take() {
        batches.push(batch);
    }

    Ok(AchFile {
        header: header.ok_or(AchParseError::MissingFileHeader)?,
        batches,
        control: control.ok_or(AchParseError::MissingFileControl)?,
    })
}

fn field(line: &str, start: usize, end: usize) -> String {
    line.get(start..end).unwrap_or("").trim().to_string()
}

fn parse_u16(line: &str, start: usize, end: usize, line_no: usize, name: &'static str) -> Result<u16, AchParseError> {
    let raw = field(line, start, end);
    raw.parse::<u16>().map_err(|_| AchParseError::BadInteger {
        line: line_no,
        field: name,
        value: raw,
    })
}

fn parse_i64(line: &str, start: usize, end: usize, line_no: usize, name: &'static str) -> Result<i64, AchParseError> {
    let raw = field(line, start, end);
    let trimmed = raw.trim_start_matches('0');
    let value = if trimmed.is_empty() { "0" } else { trimmed };
    value.parse::<i64>().map_err(|_| AchParseError::BadInteger {
        line: line_no,
        field: name,
        value: raw,
    })
}

fn parse_usize(line: &str, start: usize, end: usize, line_no: usize, name: &'static str) -> Result<usize, AchParseError> {
    parse_i64(line, start, end, line_no, name).map(|v| v as usize)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Builds a syntactically valid (if not NACHA-checksum-accurate) ACH file
    /// with one batch containing the given entries, for use by downstream
    /// unit tests that need an `AchFile` without round-tripping through bytes.
    pub fn file_with_entries(entries: Vec<EntryDetail>) -> AchFile {
        AchFile {
            header: FileHeader {
                immediate_origin: "origin1".into(),
                immediate_destination: "dest1".into(),
                file_creation_date: "240101".into(),
                file_creation_time: "0000".into(),
            },
            control: FileControl {
                batch_count: 1,
                entry_count: entries.len(),
                total_debit_entry_dollar_amount_in_file: 0,
                total_credit_entry_dollar_amount_in_file: 0,
            },
            batches: vec![Batch {
                header: BatchHeader {
                    company_name: "ACME".into(),
                    standard_entry_class: "PPD".into(),
                },
                entries,
            }],
        }
    }

    pub fn entry(code: u16, amount: i64, trace: &str) -> EntryDetail {
        EntryDetail {
            transaction_code: TransactionCode::from_code(code),
            amount,
            trace_number: trace.to_string(),
            addenda: Vec::new(),
        }
    }
}
