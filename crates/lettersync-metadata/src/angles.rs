//! Subject IDs to artwork angles.
//!
//! A 32-byte subject is read as a base-256 fraction: byte `d` contributes
//! `2π · b_d / 256^(d+1)`. The result lies in `[0, 2π)`.

use std::f64::consts::TAU;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AngleError {
    #[error("subject {0} is not valid hex")]
    InvalidHex(String),
}

/// Angle of a `0x`-prefixed hex subject ID.
pub fn subject_angle(subject: &str) -> Result<f64, AngleError> {
    let digits = subject.strip_prefix("0x").unwrap_or(subject);
    let bytes = hex::decode(digits).map_err(|_| AngleError::InvalidHex(subject.to_string()))?;
    Ok(bytes
        .iter()
        .enumerate()
        .map(|(d, &b)| TAU * f64::from(b) / 256f64.powi(d as i32 + 1))
        .sum())
}

/// Angles for the origin followed by each subject, in order.
pub fn angle_sequence<'a>(
    origin: &'a str,
    subjects: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<f64>, AngleError> {
    std::iter::once(origin)
        .chain(subjects)
        .map(subject_angle)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn subject(first: u8, second: u8) -> String {
        let mut bytes = [0u8; 32];
        bytes[0] = first;
        bytes[1] = second;
        format!("0x{}", hex::encode(bytes))
    }

    #[test]
    fn leading_byte_dominates() {
        assert_eq!(subject_angle(&subject(0, 0)).unwrap(), 0.0);
        assert!((subject_angle(&subject(0x80, 0)).unwrap() - PI).abs() < 1e-12);
        assert!((subject_angle(&subject(0x40, 0)).unwrap() - PI / 2.0).abs() < 1e-12);
        // Second byte is a 1/256 refinement of the first.
        let fine = subject_angle(&subject(0, 0x80)).unwrap();
        assert!((fine - PI / 256.0).abs() < 1e-12);
    }

    #[test]
    fn all_ones_stays_below_a_full_turn() {
        let angle = subject_angle(&format!("0x{}", "ff".repeat(32))).unwrap();
        assert!(angle < TAU);
        assert!(TAU - angle < 1e-12);
    }

    #[test]
    fn sequence_starts_with_origin() {
        let angles = angle_sequence(&subject(0x80, 0), [subject(0, 0).as_str()]).unwrap();
        assert_eq!(angles.len(), 2);
        assert!((angles[0] - PI).abs() < 1e-12);
        assert_eq!(angles[1], 0.0);
    }

    #[test]
    fn rejects_bad_hex() {
        assert_eq!(
            subject_angle("0xzz"),
            Err(AngleError::InvalidHex("0xzz".into()))
        );
    }
}
