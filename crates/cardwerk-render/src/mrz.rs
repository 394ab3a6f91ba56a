// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Machine readable zone encoder for ID-1 cards (ICAO 9303 TD1 layout).
//
// Line 1: document code, issuing state, document number, check digit, optional data.
// Line 2: birth date, sex, expiry date, nationality, optional data, composite check.
// Line 3: SURNAME<<GIVEN<NAMES.

use cardwerk_core::error::{CardwerkError, Result};
use cardwerk_core::types::{Identity, MrzPayload, Sex};
use chrono::NaiveDate;
use tracing::{debug, instrument};

/// Characters per line.
pub const LINE_LENGTH: usize = 30;

const FILLER: char = '<';
const DOCUMENT_CODE: &str = "DL";
const NUMBER_FIELD: usize = 9;
const LINE1_OPTIONAL: usize = 15;
const LINE2_OPTIONAL: usize = 11;
/// Nine characters in the number field, the rest in the line 1 optional
/// field ahead of the check digit.
pub const MAX_DOCUMENT_NUMBER: usize = NUMBER_FIELD + LINE1_OPTIONAL - 1;

/// Builds TD1 payloads for one issuing state.
#[derive(Debug, Clone)]
pub struct MrzEncoder {
    issuing_state: String,
}

impl MrzEncoder {
    pub fn new(issuing_state: &str) -> Self {
        Self {
            issuing_state: fit(&sanitize_code(issuing_state), 3),
        }
    }

    /// Encode the identity into three 30-character lines.
    #[instrument(skip_all, fields(license = %identity.license_number))]
    pub fn encode(&self, identity: &Identity) -> Result<MrzPayload> {
        let surname = sanitize_name(&identity.surname);
        let number = sanitize_code(&identity.license_number);
        let mut missing = Vec::new();
        if surname.trim_matches(FILLER).is_empty() {
            missing.push("surname");
        }
        if number.is_empty() {
            missing.push("license_number");
        }
        if !missing.is_empty() {
            return Err(CardwerkError::InvalidIdentity(missing.join(", ")));
        }
        if number.len() > MAX_DOCUMENT_NUMBER {
            return Err(CardwerkError::InvalidIdentity(format!(
                "license_number has {} characters, at most {MAX_DOCUMENT_NUMBER} fit the MRZ",
                number.len()
            )));
        }

        let line1 = self.document_line(&number);

        let birth = date_field(identity.birth_date);
        let expiry = date_field(identity.expiry_date);
        let nationality = identity
            .nationality
            .as_deref()
            .map(|n| fit(&sanitize_code(n), 3))
            .unwrap_or_else(|| self.issuing_state.clone());
        let mut line2 = String::with_capacity(LINE_LENGTH);
        line2.push_str(&birth);
        line2.push(check_digit(&birth));
        line2.push(sex_char(identity.sex));
        line2.push_str(&expiry);
        line2.push(check_digit(&expiry));
        line2.push_str(&nationality);
        line2.push_str(&fit(&sanitize_code(&identity.id_number), LINE2_OPTIONAL));
        line2.push(composite_check(&line1, &line2));

        let line3 = name_line(&surname, &sanitize_name(&identity.given_names));

        debug!(line1 = %line1, line2 = %line2, "MRZ encoded");
        Ok(MrzPayload {
            lines: [line1, line2, line3],
        })
    }

    fn document_line(&self, number: &str) -> String {
        let mut line = String::with_capacity(LINE_LENGTH);
        line.push_str(DOCUMENT_CODE);
        line.push_str(&self.issuing_state);
        if number.len() <= NUMBER_FIELD {
            line.push_str(&fit(number, NUMBER_FIELD));
            line.push(check_digit(&fit(number, NUMBER_FIELD)));
            line.push_str(&fit("", LINE1_OPTIONAL));
        } else {
            // Long numbers: first nine characters, filler in the check position,
            // then the overflow and the full number's check digit.
            let (head, tail) = number.split_at(NUMBER_FIELD);
            line.push_str(head);
            line.push(FILLER);
            let mut overflow = tail.to_owned();
            overflow.push(check_digit(number));
            line.push_str(&fit(&overflow, LINE1_OPTIONAL));
        }
        line
    }
}

/// ICAO 9303 check digit: weights 7, 3, 1 over character values modulo 10.
pub fn check_digit(field: &str) -> char {
    const WEIGHTS: [u32; 3] = [7, 3, 1];
    let sum: u32 = field
        .chars()
        .enumerate()
        .map(|(i, c)| char_value(c) * WEIGHTS[i % 3])
        .sum();
    char::from_digit(sum % 10, 10).unwrap_or('0')
}

/// Composite digit over the checked fields of lines 1 and 2.
pub fn composite_check(line1: &str, line2: &str) -> char {
    let mut joined = String::with_capacity(48);
    joined.push_str(line1.get(5..30).unwrap_or_default());
    joined.push_str(line2.get(0..7).unwrap_or_default());
    joined.push_str(line2.get(8..15).unwrap_or_default());
    joined.push_str(line2.get(18..29).unwrap_or_default());
    check_digit(&joined)
}

fn char_value(c: char) -> u32 {
    match c {
        '0'..='9' => c as u32 - '0' as u32,
        'A'..='Z' => c as u32 - 'A' as u32 + 10,
        _ => 0,
    }
}

fn date_field(date: NaiveDate) -> String {
    date.format("%y%m%d").to_string()
}

fn sex_char(sex: Sex) -> char {
    match sex {
        Sex::Male => 'M',
        Sex::Female => 'F',
        Sex::Unspecified => FILLER,
    }
}

/// Uppercase alphanumerics only.
fn sanitize_code(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Uppercase letters, separators become filler, everything else is dropped.
fn sanitize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        match c {
            'a'..='z' | 'A'..='Z' => out.push(c.to_ascii_uppercase()),
            ' ' | '-' => {
                if !out.ends_with(FILLER) {
                    out.push(FILLER);
                }
            }
            _ => {}
        }
    }
    out
}

fn name_line(surname: &str, given: &str) -> String {
    let mut line = String::with_capacity(LINE_LENGTH);
    line.push_str(surname);
    if !given.is_empty() {
        line.push_str("<<");
        line.push_str(given);
    }
    fit(&line, LINE_LENGTH)
}

/// Truncate or pad with filler to exactly `width` characters.
fn fit(value: &str, width: usize) -> String {
    let mut out: String = value.chars().take(width).collect();
    while out.len() < width {
        out.push(FILLER);
    }
    out
}
