//! Projects a generic key/value table onto the archive's signal schema:
//! which columns exist, their type and size, and their unit/factor/offset
//! for scaling.
//!
//! Every failure here is a programmer/environment error, not a query
//! failure: a missing `File.ByteOrder`, an unsupported byte order, or a
//! signal schema whose row size comes out to zero all indicate a malformed
//! archive, and binding aborts the process with a diagnostic rather than
//! returning a `Result` — matching the fail-fast policy the rest of this
//! codebase's core crates use for the same class of error.

use vdyn_archive_types::{RowLayout, Signal, SignalType};
use vdyn_info_parser::KvTable;

/// The ordered signal schema and derived row layout for one archive.
#[derive(Debug, Clone)]
pub struct SignalSchema {
    pub signals: Vec<Signal>,
    pub layout: RowLayout,
}

impl SignalSchema {
    /// Bind a parsed sidecar table to a signal schema. Panics (process
    /// abort, per the fail-fast policy) if `File.ByteOrder` is missing or
    /// not `"LittleEndian"`, if any declared signal is missing its
    /// `File.At.<i>.Type` key, or if the resulting row size is zero.
    pub fn bind(table: &KvTable) -> SignalSchema {
        let byte_order = table.get("File.ByteOrder").unwrap_or_else(|| {
            tracing::error!("sidecar is missing required key `File.ByteOrder`");
            panic!("sidecar is missing required key `File.ByteOrder`");
        });
        if byte_order != "LittleEndian" {
            tracing::error!(byte_order, "unsupported byte order");
            panic!("unsupported byte order `{byte_order}`; only `LittleEndian` is supported");
        }

        let mut signals = Vec::new();
        let mut i: usize = 1;
        loop {
            let name_key = format!("File.At.{i}.Name");
            let Some(name) = table.get(&name_key) else {
                break;
            };

            let type_key = format!("File.At.{i}.Type");
            let type_token = table.get(&type_key).unwrap_or_else(|| {
                tracing::error!(signal = name, key = %type_key, "missing required key");
                panic!("sidecar is missing required key `{type_key}` for signal `{name}`");
            });

            let signal_type = SignalType::from_token(type_token);
            if matches!(signal_type, SignalType::Unknown) {
                tracing::warn!(
                    signal = name,
                    type_token,
                    "unrecognized `File.At.<i>.Type` token; signal will fail the row-size check \
                     unless every declared signal has nonzero size"
                );
            }

            let unit = table
                .get(&format!("Quantity.{name}.Unit"))
                .unwrap_or("")
                .to_string();
            let factor = table
                .get(&format!("Quantity.{name}.Factor"))
                .and_then(|s| s.trim().parse::<f64>().ok())
                .unwrap_or(1.0);
            let offset = table
                .get(&format!("Quantity.{name}.Offset"))
                .and_then(|s| s.trim().parse::<f64>().ok())
                .unwrap_or(0.0);

            signals.push(Signal {
                name: name.to_string(),
                signal_type,
                type_size: signal_type.size(),
                unit,
                factor,
                offset,
            });
            i += 1;
        }

        let layout = RowLayout::compute(&signals);
        if layout.row_size == 0 {
            tracing::error!(
                signal_count = signals.len(),
                "row size is zero after binding the signal schema"
            );
            panic!("row size is zero; archive declares no signals with nonzero size");
        }

        tracing::debug!(
            signal_count = signals.len(),
            row_size = layout.row_size,
            "bound signal schema"
        );

        SignalSchema { signals, layout }
    }

    /// Index of the signal named `name`, by linear scan of declaration
    /// order. `N` is bounded in the low hundreds to low thousands for real
    /// archives, and lookup happens at most once per requested column.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.signals.iter().position(|s| s.name == name)
    }

    /// The signal schema row for `name`, or `None` if the archive has no
    /// such column.
    pub fn get(&self, name: &str) -> Option<&Signal> {
        self.find(name).map(|i| &self.signals[i])
    }
}
