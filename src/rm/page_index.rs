//! Key -> page-id routing strategies (spec §4.1.5, §9 DESIGN NOTES).
//!
//! Modeled as an explicit enum of capability variants rather than a trait
//! object, per the DESIGN NOTES preference for "capability sets with
//! explicit variants... inject via constructor parameters, never via
//! global lookup."

use serde::{Deserialize, Serialize};

/// The two required index strategies plus their configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeySpec {
    /// Prefix-sharded ordered index for single-column keys: pages are keyed
    /// by a configurable-length prefix of the stringified key.
    PrefixOrdered {
        /// Length, in bytes, of the prefix used as the page id.
        prefix_len: usize,
    },
    /// Composite fixed-width index for multi-column keys: each column is
    /// padded to a declared width, and the page id is a prefix over one or
    /// more columns.
    CompositeFixedWidth {
        /// Declared width (in bytes) of each column, in column order.
        column_widths: Vec<usize>,
        /// Number of leading columns that determine the page id.
        page_id_columns: usize,
    },
}

impl KeySpec {
    /// Convenience constructor for a single-column key with the given
    /// page-id prefix length.
    pub fn single_column(prefix_len: usize) -> Self {
        KeySpec::PrefixOrdered { prefix_len }
    }

    /// Encodes a tuple of raw column values into this spec's fixed-width
    /// injective internal key representation (§3.1, §9 DESIGN NOTES).
    ///
    /// For [`KeySpec::PrefixOrdered`] there is exactly one column and the
    /// "encoding" is the identity function.
    pub fn encode(&self, columns: &[&str]) -> Result<String, String> {
        match self {
            KeySpec::PrefixOrdered { .. } => {
                if columns.len() != 1 {
                    return Err(format!("expected 1 column, got {}", columns.len()));
                }
                Ok(columns[0].to_string())
            }
            KeySpec::CompositeFixedWidth { column_widths, .. } => {
                if columns.len() != column_widths.len() {
                    return Err(format!(
                        "expected {} columns, got {}",
                        column_widths.len(),
                        columns.len()
                    ));
                }
                let mut out = String::new();
                for (col, width) in columns.iter().zip(column_widths.iter()) {
                    if col.len() > *width {
                        return Err(format!(
                            "column {col:?} exceeds declared width {width}"
                        ));
                    }
                    out.push_str(col);
                    out.extend(std::iter::repeat(' ').take(width - col.len()));
                }
                Ok(out)
            }
        }
    }

    /// Computes the page id that owns the given internal key.
    pub fn page_id(&self, key: &str) -> String {
        match self {
            KeySpec::PrefixOrdered { prefix_len } => {
                let take = (*prefix_len).min(key.len());
                key[..take].to_string()
            }
            KeySpec::CompositeFixedWidth { column_widths, page_id_columns } => {
                let take: usize = column_widths.iter().take(*page_id_columns).sum();
                let take = take.min(key.len());
                key[..take].to_string()
            }
        }
    }
}
