//! Certificate file format: everything needed to re-verify, without re-running the solver, that a
//! dual vector is non-negative on every inflation event and strictly positive on the target
//! distribution (spec §6). Both a line-delimited text format and a `bincode` binary format encode
//! the same field sequence.

use crate::constraint_set::ConstraintSet;
use crate::error::{Error, Result};
use crate::inflation::Inflation;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};

const VERSION: u32 = 1;

/// The "METADATA" section header (spec §6).
const METADATA_HEADER: &str = "METADATA";
/// The "CONSTRAINT SET" section header.
const CONSTRAINT_SET_HEADER: &str = "CONSTRAINT SET";
/// The "DUAL VECTOR" section header.
const DUAL_VECTOR_HEADER: &str = "DUAL VECTOR";

/// The full field sequence making up a certificate file (spec §6), independent of whether it's
/// rendered as text or as `bincode`.
#[derive(Serialize, Deserialize)]
struct Certificate {
    version: u32,
    metadata: String,
    inflation_metadata: String,
    pretty_descriptions: Vec<String>,
    quovecs: Vec<Vec<i64>>,
}

impl Certificate {
    fn collect(metadata: &str, inflation: &Inflation, constraints: &ConstraintSet) -> Self {
        let pretty_descriptions: Vec<String> =
            constraints.constraints().iter().map(|c| c.pretty_description().to_string()).collect();
        let quovecs: Vec<Vec<i64>> = constraints.constraints().iter().map(|c| c.dual_vector().quovec()).collect();

        Self {
            version: VERSION,
            metadata: metadata.to_string(),
            inflation_metadata: inflation.metadata(),
            pretty_descriptions,
            quovecs,
        }
    }

    /// Checks this certificate against the live problem it's being loaded into, then sets the
    /// decoded dual vector onto `constraints`.
    fn apply(self, expected_metadata: &str, inflation: &Inflation, constraints: &mut ConstraintSet) -> Result<()> {
        if self.version != VERSION {
            return Err(Error::FileFormatMismatch(format!("certificate version {} != expected {VERSION}", self.version)));
        }
        if self.metadata != expected_metadata {
            return Err(Error::FileFormatMismatch(format!(
                "certificate metadata {:?} != expected {expected_metadata:?}",
                self.metadata
            )));
        }
        let live_inflation_metadata = inflation.metadata();
        if self.inflation_metadata != live_inflation_metadata {
            return Err(Error::FileFormatMismatch(format!(
                "certificate inflation metadata {:?} != live inflation metadata {live_inflation_metadata:?}",
                self.inflation_metadata
            )));
        }

        let live_descriptions: Vec<&str> = constraints.constraints().iter().map(|c| c.pretty_description()).collect();
        if self.pretty_descriptions.iter().map(String::as_str).ne(live_descriptions.iter().copied()) {
            return Err(Error::FileFormatMismatch(format!(
                "certificate constraint descriptions {:?} != live descriptions {live_descriptions:?}",
                self.pretty_descriptions
            )));
        }

        if self.quovecs.len() != constraints.constraints().len() {
            return Err(Error::FileFormatMismatch(format!(
                "certificate has {} constraint dual vectors, expected {}",
                self.quovecs.len(),
                constraints.constraints().len()
            )));
        }
        let mut flat = Vec::with_capacity(constraints.quovec_size());
        for (quovec, constraint) in self.quovecs.iter().zip(constraints.constraints()) {
            if quovec.len() != constraint.quovec_size() {
                return Err(Error::FileFormatMismatch(format!(
                    "constraint {:?}: certificate dual vector has {} entries, expected {}",
                    constraint.pretty_description(),
                    quovec.len(),
                    constraint.quovec_size()
                )));
            }
            flat.extend_from_slice(quovec);
        }

        constraints.set_dual_vector_from_quovec(&flat)
    }
}

/// Writes `metadata`, `inflation` and `constraints`' current dual vector to `writer` in the
/// line-delimited text format (spec §6).
///
/// # Errors
///
/// Returns [`Error::Other`] if writing to `writer` fails.
pub fn write_text(mut writer: impl Write, metadata: &str, inflation: &Inflation, constraints: &ConstraintSet) -> Result<()> {
    let cert = Certificate::collect(metadata, inflation, constraints);

    writeln!(writer, "{}", cert.version).map_err(io_err)?;
    writeln!(writer, "{}", cert.metadata).map_err(io_err)?;
    writeln!(writer, "{METADATA_HEADER}").map_err(io_err)?;
    writeln!(writer, "{}", cert.inflation_metadata).map_err(io_err)?;
    writeln!(writer, "{CONSTRAINT_SET_HEADER}").map_err(io_err)?;
    for description in &cert.pretty_descriptions {
        writeln!(writer, "{description}").map_err(io_err)?;
    }
    writeln!(writer, "{DUAL_VECTOR_HEADER}").map_err(io_err)?;
    for (description, quovec) in cert.pretty_descriptions.iter().zip(&cert.quovecs) {
        writeln!(writer, "{description}").map_err(io_err)?;
        writeln!(writer, "{}", quovec.len()).map_err(io_err)?;
        for &coeff in quovec {
            writeln!(writer, "{}", hex_encode(coeff)).map_err(io_err)?;
        }
    }
    Ok(())
}

/// Reads a text-format certificate from `reader`, checks it against the live problem given by
/// `inflation`/`constraints`, and sets the decoded dual vector onto `constraints`.
///
/// # Errors
///
/// Returns [`Error::FileFormatMismatch`] if any field disagrees with the live problem, or
/// [`Error::Other`] if `reader` can't be read or a line is malformed.
pub fn read_text(reader: impl BufRead, expected_metadata: &str, inflation: &Inflation, constraints: &mut ConstraintSet) -> Result<()> {
    let mut lines = reader.lines();
    let mut next_line = |what: &'static str| -> Result<String> {
        lines
            .next()
            .ok_or_else(|| Error::FileFormatMismatch(format!("certificate ended before {what}")))?
            .map_err(io_err)
    };

    let version: u32 = next_line("version")?.parse().map_err(|_| Error::FileFormatMismatch("malformed version line".to_string()))?;
    let metadata = next_line("metadata")?;
    let header = next_line(METADATA_HEADER)?;
    if header != METADATA_HEADER {
        return Err(Error::FileFormatMismatch(format!("expected {METADATA_HEADER:?} header, found {header:?}")));
    }
    let inflation_metadata = next_line("inflation metadata")?;
    let header = next_line(CONSTRAINT_SET_HEADER)?;
    if header != CONSTRAINT_SET_HEADER {
        return Err(Error::FileFormatMismatch(format!("expected {CONSTRAINT_SET_HEADER:?} header, found {header:?}")));
    }

    let n_constraints = constraints.constraints().len();
    let mut pretty_descriptions = Vec::with_capacity(n_constraints);
    for _ in 0..n_constraints {
        pretty_descriptions.push(next_line("a constraint description")?);
    }

    let header = next_line(DUAL_VECTOR_HEADER)?;
    if header != DUAL_VECTOR_HEADER {
        return Err(Error::FileFormatMismatch(format!("expected {DUAL_VECTOR_HEADER:?} header, found {header:?}")));
    }

    let mut quovecs = Vec::with_capacity(n_constraints);
    for expected_description in &pretty_descriptions {
        let description = next_line("a re-verified constraint description")?;
        if &description != expected_description {
            return Err(Error::FileFormatMismatch(format!(
                "dual vector section description {description:?} != constraint set description {expected_description:?}"
            )));
        }
        let count: usize = next_line("a dual vector entry count")?
            .parse()
            .map_err(|_| Error::FileFormatMismatch("malformed dual vector entry count".to_string()))?;
        let mut quovec = Vec::with_capacity(count);
        for _ in 0..count {
            quovec.push(hex_decode(&next_line("a dual vector entry")?)?);
        }
        quovecs.push(quovec);
    }

    let cert = Certificate { version, metadata, inflation_metadata, pretty_descriptions, quovecs };
    cert.apply(expected_metadata, inflation, constraints)
}

/// Writes a `bincode`-encoded certificate to `writer`: the same field sequence as
/// [`write_text`], but with length-prefixed strings and fixed-width little-endian integers
/// (spec §6), matching `pineappl::grid::Grid::write`'s binary round-trip.
///
/// # Errors
///
/// Returns [`Error::Other`] if serialization or writing fails.
pub fn write_binary(writer: impl Write, metadata: &str, inflation: &Inflation, constraints: &ConstraintSet) -> Result<()> {
    let cert = Certificate::collect(metadata, inflation, constraints);
    bincode::serialize_into(writer, &cert).map_err(|e| Error::Other(anyhow::Error::new(e)))
}

/// Reads a `bincode`-encoded certificate, checks it against the live problem, and sets the
/// decoded dual vector onto `constraints`.
///
/// # Errors
///
/// Returns [`Error::FileFormatMismatch`] if any field disagrees with the live problem, or
/// [`Error::Other`] if deserialization fails.
pub fn read_binary(reader: impl std::io::Read, expected_metadata: &str, inflation: &Inflation, constraints: &mut ConstraintSet) -> Result<()> {
    let cert: Certificate = bincode::deserialize_from(reader).map_err(|e| Error::Other(anyhow::Error::new(e)))?;
    cert.apply(expected_metadata, inflation, constraints)
}

fn io_err(e: std::io::Error) -> Error {
    Error::Other(e.into())
}

/// Encodes a signed integer as a sign character (`+`/`-`) followed by its hex magnitude (spec §6).
fn hex_encode(value: i64) -> String {
    let sign = if value < 0 { '-' } else { '+' };
    format!("{sign}{:x}", value.unsigned_abs())
}

fn hex_decode(s: &str) -> Result<i64> {
    let mut chars = s.chars();
    let sign = match chars.next() {
        Some('+') => 1,
        Some('-') => -1,
        _ => return Err(Error::FileFormatMismatch(format!("malformed signed hex integer {s:?}"))),
    };
    let magnitude = u64::from_str_radix(chars.as_str(), 16).map_err(|_| Error::FileFormatMismatch(format!("malformed signed hex integer {s:?}")))?;
    Ok(sign * i64::try_from(magnitude).map_err(|_| Error::FileFormatMismatch(format!("signed hex integer {s:?} overflows i64")))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inflation::UseDistrSymmetries;
    use crate::network::{Network, TargetDistr};
    use crate::tensor::EventTensor;

    fn srb_distr(n: u8) -> TargetDistr {
        let network = Network::new(n);
        let mut tensor = EventTensor::zeros(3, u64::from(n));
        tensor.set_denominator(i64::from(n));
        for a in 0..n {
            tensor.set(&[a, a, a], 1);
        }
        TargetDistr::new(network, tensor, "srb")
    }

    fn built_problem() -> (Inflation, ConstraintSet) {
        let mut distr = srb_distr(2);
        let inflation = Inflation::new(&distr, [2, 1, 1], UseDistrSymmetries::Yes);
        let descriptions = vec![vec!["A00,B00,C00".to_string(), String::new()]];
        let mut constraints = ConstraintSet::new(&inflation, &descriptions, true).unwrap();
        constraints.set_target_distribution(&mut distr);
        let quovec: Vec<i64> = (0..constraints.quovec_size()).map(|i| if i % 2 == 0 { 3 } else { -5 }).collect();
        constraints.set_dual_vector_from_quovec(&quovec).unwrap();
        (inflation, constraints)
    }

    #[test]
    fn hex_round_trips_negative_and_positive_values() {
        assert_eq!(hex_decode(&hex_encode(0)).unwrap(), 0);
        assert_eq!(hex_decode(&hex_encode(255)).unwrap(), 255);
        assert_eq!(hex_decode(&hex_encode(-4096)).unwrap(), -4096);
    }

    #[test]
    fn text_certificate_round_trips() {
        let (inflation, constraints) = built_problem();

        let mut buf = Vec::new();
        write_text(&mut buf, "srb test", &inflation, &constraints).unwrap();

        let (_, mut fresh_constraints) = built_problem();
        // Clobber the dual vector so the read-back has to actually restore it.
        let zero = vec![0i64; fresh_constraints.quovec_size()];
        fresh_constraints.set_dual_vector_from_quovec(&zero).unwrap();

        read_text(buf.as_slice(), "srb test", &inflation, &mut fresh_constraints).unwrap();

        let original_quovec: Vec<i64> = constraints.constraints()[0].dual_vector().quovec();
        let restored_quovec: Vec<i64> = fresh_constraints.constraints()[0].dual_vector().quovec();
        assert_eq!(original_quovec, restored_quovec);
    }

    #[test]
    fn text_certificate_rejects_mismatched_metadata() {
        let (inflation, constraints) = built_problem();
        let mut buf = Vec::new();
        write_text(&mut buf, "srb test", &inflation, &constraints).unwrap();

        let (_, mut fresh_constraints) = built_problem();
        let err = read_text(buf.as_slice(), "a different label", &inflation, &mut fresh_constraints).unwrap_err();
        assert!(matches!(err, Error::FileFormatMismatch(_)));
    }

    #[test]
    fn binary_certificate_round_trips() {
        let (inflation, constraints) = built_problem();

        let mut buf = Vec::new();
        write_binary(&mut buf, "srb test", &inflation, &constraints).unwrap();

        let (_, mut fresh_constraints) = built_problem();
        let zero = vec![0i64; fresh_constraints.quovec_size()];
        fresh_constraints.set_dual_vector_from_quovec(&zero).unwrap();

        read_binary(buf.as_slice(), "srb test", &inflation, &mut fresh_constraints).unwrap();

        let original_quovec: Vec<i64> = constraints.constraints()[0].dual_vector().quovec();
        let restored_quovec: Vec<i64> = fresh_constraints.constraints()[0].dual_vector().quovec();
        assert_eq!(original_quovec, restored_quovec);
    }
}
