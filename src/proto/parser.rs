// src/proto/parser.rs
use std::str::FromStr;

use thiserror::Error;

use super::command::{Answer, RateUnit, RequestKind};

/// Idle poll sent while the pump runs, to make it answer with a status marker.
pub const KEEP_ALIVE: &[u8] = b"\r";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("answer is not ASCII text")]
    NotText,
    #[error("empty answer")]
    Empty,
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid number for {0}: {1}")]
    BadNumber(&'static str, String),
    #[error("unknown rate unit: {0}")]
    BadUnit(String),
    #[error("no answer expected for {0:?}")]
    Unexpected(RequestKind),
}

/// Public API: serialize a request to its CR-terminated wire form.
pub fn format_request(req: &RequestKind) -> String {
    use RequestKind::*;
    let mut out = match req {
        SetDiameter(mm) => format!("MMD{:.5}", mm),
        SetRate(rate, unit) => format!("{}{:.5}", unit_to_command(*unit), rate),
        SetTarget(ml) => format!("MLT{:.5}", ml),
        Run => "RUN".to_string(),
        Stop => "STP".to_string(),
        GetDiameter => "DIA".to_string(),
        GetRate => "RAT".to_string(),
        GetTarget => "TAR".to_string(),
    };
    out.push('\r');
    out
}

/// Public API: decode a completed answer packet for the query it answers.
///
/// The pump may echo the query mnemonic ahead of the value (`DIA4.78000`);
/// the echo is skipped when present.
pub fn decode_answer(req: &RequestKind, packet: &[u8]) -> Result<Answer, DecodeError> {
    let text = std::str::from_utf8(packet).map_err(|_| DecodeError::NotText)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }

    match req {
        RequestKind::GetDiameter => {
            Ok(Answer::Diameter(req_f64(strip_echo(text, "DIA"), "diameter")?))
        }
        RequestKind::GetTarget => Ok(Answer::Target(req_f64(strip_echo(text, "TAR"), "target")?)),
        RequestKind::GetRate => {
            let tokens: Vec<&str> = strip_echo(text, "RAT").split_whitespace().collect();
            let rate = tokens.first().ok_or(DecodeError::MissingField("rate"))?;
            let rate = req_f64(rate, "rate")?;
            if tokens.len() < 2 {
                return Err(DecodeError::MissingField("unit"));
            }
            let unit = tokens[tokens.len() - 1];
            let unit =
                RateUnit::from_str(unit).map_err(|_| DecodeError::BadUnit(unit.to_string()))?;
            Ok(Answer::Rate(rate, unit))
        }
        other => Err(DecodeError::Unexpected(*other)),
    }
}

/// Human readable volume: below one millilitre it is shown in microlitres.
pub fn format_volume(ml: f64) -> String {
    if ml < 1.0 {
        format!("{:.5} µl", ml * 1000.0)
    } else {
        format!("{:.5} ml", ml)
    }
}

/* ---------- helpers ---------- */

fn strip_echo<'a>(text: &'a str, mnemonic: &str) -> &'a str {
    text.strip_prefix(mnemonic).unwrap_or(text).trim()
}

fn req_f64(v: &str, k: &'static str) -> Result<f64, DecodeError> {
    v.parse::<f64>()
        .map_err(|_| DecodeError::BadNumber(k, v.to_string()))
}

/* ---------- enum string helpers & FromStr impls ---------- */

/// Rate command mnemonics, indexed by [`RateUnit::ordinal`].
const UNIT_COMMANDS: [&str; 4] = ["MLM", "ULM", "MLH", "ULH"];
/// Canonical (lowercase) answer tokens, indexed by [`RateUnit::ordinal`].
const UNIT_TOKENS: [&str; 4] = ["ml/mn", "ul/mn", "ml/hr", "ul/hr"];

pub fn unit_to_command(u: RateUnit) -> &'static str {
    UNIT_COMMANDS[u.ordinal()]
}

pub fn unit_to_str(u: RateUnit) -> &'static str {
    UNIT_TOKENS[u.ordinal()]
}

impl FromStr for RateUnit {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UNIT_TOKENS
            .iter()
            .position(|t| t.eq_ignore_ascii_case(s))
            .and_then(RateUnit::from_ordinal)
            .ok_or(())
    }
}

impl std::fmt::Display for RateUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(unit_to_str(*self))
    }
}

/* ---------- tests ---------- */
