//! CSV output

use crate::tracker::{Source, Tracker, COLUMNS};

use anyhow::{Context, Result};
use colored::*;
use std::io::Write;

/// Writes header plus one row per issue of all `sources`, in source order.
///
/// Rows are written as issues arrive. Returns the number of rows written (excluding the header).
pub fn write_csv<W: Write>(sources: &[Source], out: W) -> Result<usize> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(out);
    wtr.write_record(&COLUMNS).context("Cannot write CSV header")?;
    let mut total = 0;
    for src in sources {
        let mut n = 0;
        for iss in src.get_all() {
            let iss = iss.with_context(|| format!("Failed to retrieve issues from {}", src))?;
            wtr.serialize(&iss)
                .with_context(|| format!("Cannot write CSV row for {} #{}", iss.source, iss.id))?;
            n += 1;
        }
        info!("{}: {} issue(s)", src.to_string().yellow(), n);
        total += n;
    }
    wtr.flush().context("broken pipe")?;
    Ok(total)
}
