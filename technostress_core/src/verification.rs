//! One-time email codes gating access to the form.
//!
//! The state lives in a [`VerificationSession`] owned by the caller for the
//! duration of one participant session. Issuing a code does not touch the
//! session: the caller first delivers the [`PendingCode`] and only then records
//! it with [`VerificationSession::record_sent`], so that a failed delivery
//! leaves the session as it was.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use rand::Rng;

use crate::config::VerificationFailure;
use crate::normalize_identity;

/// How long an issued code stays valid.
pub const CODE_VALIDITY_SECONDS: i64 = 5 * 60;

const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum VerificationState {
    NoCodeSent,
    CodeSent {
        address: String,
        code: String,
        expires_at: DateTime<Utc>,
    },
    Verified {
        address: String,
    },
}

/// The state as observed at a given time.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum VerificationStatus {
    NoCodeSent,
    CodeSent,
    Expired,
    Verified,
}

/// A code ready to be delivered, not yet recorded in the session.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PendingCode {
    /// The address as entered, without surrounding whitespace. Messages are sent there.
    pub address: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl PendingCode {
    /// Draws a fresh 6-digit code for this address.
    pub fn generate<R: Rng>(address: &str, now: DateTime<Utc>, rng: &mut R) -> PendingCode {
        let code: u32 = rng.gen_range(CODE_MIN..=CODE_MAX);
        PendingCode {
            address: address.trim().to_string(),
            code: code.to_string(),
            expires_at: now + Duration::seconds(CODE_VALIDITY_SECONDS),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct VerificationSession {
    state: VerificationState,
}

impl Default for VerificationSession {
    fn default() -> Self {
        VerificationSession::new()
    }
}

impl VerificationSession {
    pub fn new() -> VerificationSession {
        VerificationSession {
            state: VerificationState::NoCodeSent,
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> VerificationStatus {
        match &self.state {
            VerificationState::NoCodeSent => VerificationStatus::NoCodeSent,
            VerificationState::CodeSent { expires_at, .. } if now > *expires_at => {
                VerificationStatus::Expired
            }
            VerificationState::CodeSent { .. } => VerificationStatus::CodeSent,
            VerificationState::Verified { .. } => VerificationStatus::Verified,
        }
    }

    /// Prepares a resend of the pending code: same value, renewed expiry.
    pub fn resend(&self, now: DateTime<Utc>) -> Result<PendingCode, VerificationFailure> {
        match &self.state {
            VerificationState::CodeSent { address, code, .. } => Ok(PendingCode {
                address: address.clone(),
                code: code.clone(),
                expires_at: now + Duration::seconds(CODE_VALIDITY_SECONDS),
            }),
            VerificationState::NoCodeSent | VerificationState::Verified { .. } => {
                Err(VerificationFailure::NoPendingCode)
            }
        }
    }

    /// Records a delivered code. Any previously pending code is invalidated.
    pub fn record_sent(&mut self, pending: PendingCode) {
        info!(
            "record_sent: code pending until {}",
            pending.expires_at.format("%H:%M:%S")
        );
        self.state = VerificationState::CodeSent {
            address: pending.address,
            code: pending.code,
            expires_at: pending.expires_at,
        };
    }

    /// Checks a code entered by the participant.
    ///
    /// Addresses are compared after normalization. On failure the state is left
    /// unchanged. On success the code is consumed.
    pub fn verify(
        &mut self,
        address: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(), VerificationFailure> {
        let address = normalize_identity(address);
        let verified = match &self.state {
            VerificationState::CodeSent {
                address: pending_address,
                code: pending_code,
                expires_at,
            } if normalize_identity(pending_address) == address => {
                if now > *expires_at {
                    debug!("verify: code expired at {}", expires_at);
                    return Err(VerificationFailure::Expired);
                }
                if pending_code.as_str() != code.trim() {
                    return Err(VerificationFailure::Mismatch);
                }
                VerificationState::Verified {
                    address: pending_address.clone(),
                }
            }
            VerificationState::NoCodeSent
            | VerificationState::CodeSent { .. }
            | VerificationState::Verified { .. } => {
                return Err(VerificationFailure::NoPendingCode);
            }
        };
        info!("verify: address verified");
        self.state = verified;
        Ok(())
    }

    pub fn is_verified(&self, address: &str) -> bool {
        matches!(&self.state, VerificationState::Verified { address: a }
            if normalize_identity(a) == normalize_identity(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn sent_session(rng: &mut StdRng) -> (VerificationSession, String) {
        let mut s = VerificationSession::new();
        let p = PendingCode::generate("Student@Uni.edu", t0(), rng);
        let code = p.code.clone();
        s.record_sent(p);
        (s, code)
    }

    #[test]
    fn codes_have_six_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let p = PendingCode::generate("a@b.c", t0(), &mut rng);
            assert_eq!(p.code.len(), 6);
            assert!(p.code.chars().all(|c| c.is_ascii_digit()));
            assert_eq!(p.expires_at, t0() + Duration::minutes(5));
        }
    }

    #[test]
    fn typed_address_is_kept_for_delivery() {
        let mut rng = StdRng::seed_from_u64(6);
        let p = PendingCode::generate("  Jane.Doe@Uni.edu ", t0(), &mut rng);
        assert_eq!(p.address, "Jane.Doe@Uni.edu");
        let code = p.code.clone();
        let mut s = VerificationSession::new();
        s.record_sent(p);
        s.verify("jane.doe@uni.edu", &code, t0()).unwrap();
        assert!(s.is_verified("JANE.DOE@UNI.EDU"));
        assert!(!s.is_verified("john@uni.edu"));
    }

    #[test]
    fn generating_does_not_touch_the_session() {
        let mut rng = StdRng::seed_from_u64(1);
        let s = VerificationSession::new();
        let _ = PendingCode::generate("a@b.c", t0(), &mut rng);
        assert_eq!(s.status(t0()), VerificationStatus::NoCodeSent);
    }

    #[test]
    fn verify_success_consumes_the_code() {
        let mut rng = StdRng::seed_from_u64(2);
        let (mut s, code) = sent_session(&mut rng);
        assert_eq!(s.status(t0()), VerificationStatus::CodeSent);
        s.verify(" student@uni.edu", &code, t0() + Duration::minutes(4))
            .unwrap();
        assert!(s.is_verified("STUDENT@uni.edu"));
        assert_eq!(s.status(t0()), VerificationStatus::Verified);
        assert_eq!(
            s.verify("student@uni.edu", &code, t0()),
            Err(VerificationFailure::NoPendingCode)
        );
    }

    #[test]
    fn failures_leave_state_unchanged() {
        let mut rng = StdRng::seed_from_u64(3);
        let (mut s, code) = sent_session(&mut rng);
        let before = s.clone();

        let wrong = if code == "123456" { "654321" } else { "123456" };
        assert_eq!(
            s.verify("student@uni.edu", wrong, t0()),
            Err(VerificationFailure::Mismatch)
        );
        assert_eq!(s, before);

        assert_eq!(
            s.verify("other@uni.edu", &code, t0()),
            Err(VerificationFailure::NoPendingCode)
        );
        assert_eq!(s, before);

        let late = t0() + Duration::seconds(CODE_VALIDITY_SECONDS + 1);
        assert_eq!(s.status(late), VerificationStatus::Expired);
        assert_eq!(
            s.verify("student@uni.edu", &code, late),
            Err(VerificationFailure::Expired)
        );
        assert_eq!(s, before);

        // The right code still works within the validity window.
        s.verify("student@uni.edu", &code, t0()).unwrap();
    }

    #[test]
    fn no_code_sent() {
        let mut s = VerificationSession::new();
        assert_eq!(
            s.verify("a@b.c", "123456", t0()),
            Err(VerificationFailure::NoPendingCode)
        );
        assert_eq!(s.resend(t0()), Err(VerificationFailure::NoPendingCode));
    }

    #[test]
    fn resend_keeps_code_and_renews_expiry() {
        let mut rng = StdRng::seed_from_u64(4);
        let (mut s, code) = sent_session(&mut rng);
        let later = t0() + Duration::minutes(10);
        assert_eq!(s.status(later), VerificationStatus::Expired);

        let p = s.resend(later).unwrap();
        assert_eq!(p.code, code);
        assert_eq!(p.expires_at, later + Duration::minutes(5));
        s.record_sent(p);
        assert_eq!(s.status(later), VerificationStatus::CodeSent);
        s.verify("student@uni.edu", &code, later + Duration::minutes(1))
            .unwrap();
    }

    #[test]
    fn regeneration_invalidates_previous_code() {
        let mut rng = StdRng::seed_from_u64(5);
        let (mut s, first) = sent_session(&mut rng);
        let mut second = PendingCode::generate("student@uni.edu", t0(), &mut rng);
        while second.code == first {
            second = PendingCode::generate("student@uni.edu", t0(), &mut rng);
        }
        let second_code = second.code.clone();
        s.record_sent(second);
        assert_eq!(
            s.verify("student@uni.edu", &first, t0()),
            Err(VerificationFailure::Mismatch)
        );
        s.verify("student@uni.edu", &second_code, t0()).unwrap();
    }
}
