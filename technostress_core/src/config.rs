// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;
use std::str::FromStr;

use chrono::NaiveDateTime;

/// Maximum number of accepted submissions for the same identity.
pub const MAX_PARTICIPATION: usize = 2;

/// Number of Likert items in the questionnaire.
pub const NUM_ITEMS: usize = 12;

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;

/// The question codes, in the order of the questionnaire and of the store columns.
pub const QUESTION_CODES: [&str; NUM_ITEMS] = [
    "S1", "S2", "S3", "S4", "S5", "S6", "S7", "S8", "S9", "S10", "S11", "S12",
];

/// The statements of the questionnaire, rated from 1 (strongly disagree) to 5 (strongly agree).
pub const QUESTIONS: [(&str, &str); NUM_ITEMS] = [
    (
        "S1",
        "To what extent do you think notifications affect you?",
    ),
    (
        "S2",
        "Do you feel your attention is scattered when a notification arrives?",
    ),
    ("S3", "I feel the urge to check a notification immediately."),
    ("S4", "I find it hard to manage incoming notifications."),
    ("S5", "Learning new technologies stresses me."),
    (
        "S6",
        "I check my device frequently so as not to miss notifications.",
    ),
    (
        "S7",
        "Technical failures (app crashes, connection drops, etc.) stress me.",
    ),
    (
        "S8",
        "Work/school notifications negatively affect my private life.",
    ),
    ("S9", "I feel pressure to be constantly online."),
    (
        "S10",
        "I find it hard to stay away from technology during the day.",
    ),
    (
        "S11",
        "Situations where I feel inadequate with technology stress me.",
    ),
    (
        "S12",
        "I feel I struggle to keep up with new technological changes.",
    ),
];

/// Declares one of the fixed multiple-choice fields of the form.
///
/// Every variant carries its canonical label, which is what gets written to the
/// store. Parsing is case-insensitive on the label.
macro_rules! choice_field {
    ($(#[$meta:meta])* $name:ident, $field:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.label())
            }
        }

        impl FromStr for $name {
            type Err = IntakeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let needle = s.trim();
                $name::ALL
                    .iter()
                    .find(|c| c.label().eq_ignore_ascii_case(needle))
                    .copied()
                    .ok_or_else(|| IntakeError::InvalidChoice {
                        field: $field,
                        value: s.to_string(),
                    })
            }
        }
    };
}

choice_field!(
    /// Self-reported gender.
    Gender, "gender", {
    Female => "Female",
    Male => "Male",
    Other => "Other / Prefer not to say",
});

choice_field!(AgeBracket, "age", {
    From18To21 => "18-21",
    From22To26 => "22-26",
    From27To35 => "27-35",
    From36To45 => "36-45",
    Over46 => "46+",
});

choice_field!(
    /// Highest education level of a parent.
    EducationLevel, "education", {
    NotLiterate => "Not literate",
    Primary => "Primary school",
    Middle => "Middle school",
    High => "High school",
    University => "University",
    Graduate => "Graduate degree",
});

choice_field!(
    /// Average daily screen time, in hours.
    ScreenTime, "screen_time", {
    UpTo1 => "0-1",
    From2To5 => "2-5",
    From6To10 => "6-10",
    Over10 => "10+",
});

choice_field!(
    /// Average number of notifications received per day.
    NotificationCount, "notification_count", {
    UpTo30 => "0-30",
    From31To60 => "31-60",
    From61To100 => "61-100",
    Over100 => "100+",
});

choice_field!(NotificationType, "notification_type", {
    SocialMedia => "Social media",
    Email => "Email",
    Games => "Games",
    News => "News",
    Education => "Education",
    Other => "Other",
});

choice_field!(Device, "device", {
    Phone => "Phone",
    Tablet => "Tablet",
    Computer => "Computer",
    Smartwatch => "Smartwatch",
});

choice_field!(
    /// Three-bucket classification of the average score.
    StressLevel, "level", {
    Low => "Low",
    Medium => "Medium",
    High => "High",
});

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Demographics {
    pub gender: Gender,
    pub age: AgeBracket,
    /// Free text, recorded verbatim.
    pub department: String,
    pub mother_education: EducationLevel,
    pub father_education: EducationLevel,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Usage {
    pub screen_time: ScreenTime,
    pub notification_count: NotificationCount,
    pub notification_type: NotificationType,
    pub device: Device,
}

/// The scores of the 12 items, in the order of `QUESTION_CODES`.
///
/// Invariant: every score is in [MIN_SCORE, MAX_SCORE].
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct ItemScores([u8; NUM_ITEMS]);

impl ItemScores {
    pub fn new(scores: &[u8]) -> Result<ItemScores, IntakeError> {
        let arr: [u8; NUM_ITEMS] =
            scores
                .try_into()
                .map_err(|_| IntakeError::WrongItemCount {
                    expected: NUM_ITEMS,
                    found: scores.len(),
                })?;
        for (code, score) in QUESTION_CODES.iter().zip(arr.iter()) {
            if !(MIN_SCORE..=MAX_SCORE).contains(score) {
                return Err(IntakeError::ScoreOutOfRange {
                    code: *code,
                    score: *score,
                });
            }
        }
        Ok(ItemScores(arr))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

/// The SHA-256 digest (lowercase hex) of a normalized identity token.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct IdentityHash(pub String);

impl Display for IdentityHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A filled form, as submitted by a participant.
///
/// The raw identity only lives here: it is hashed before anything is stored.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct FormSubmission {
    pub identity: String,
    pub demographics: Demographics,
    pub usage: Usage,
    pub scores: ItemScores,
}

/// One row of the store. Created once, never mutated.
#[derive(PartialEq, Debug, Clone)]
pub struct ResponseRecord {
    pub timestamp: NaiveDateTime,
    pub identity_hash: IdentityHash,
    pub demographics: Demographics,
    pub usage: Usage,
    pub scores: ItemScores,
    pub average: f64,
    pub level: StressLevel,
}

// ******** Output data structures *********

/// Count and mean of the average score for one group.
#[derive(PartialEq, Debug, Clone)]
pub struct GroupStats<K> {
    pub key: K,
    pub count: usize,
    pub mean: f64,
}

/// Aggregates over a non-empty record set.
#[derive(PartialEq, Debug, Clone)]
pub struct Summary {
    pub total: usize,
    pub overall_mean: f64,
    /// Sorted by gender, only the genders present in the data.
    pub by_gender: Vec<GroupStats<Gender>>,
    /// Sorted by level, only the levels present in the data.
    pub by_level: Vec<(StressLevel, usize)>,
}

/// Reasons why an email verification attempt fails.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum VerificationFailure {
    /// No code was issued for this address, or it was already used.
    NoPendingCode,
    Expired,
    Mismatch,
}

impl Display for VerificationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationFailure::NoPendingCode => {
                write!(f, "no verification code is pending for this address")
            }
            VerificationFailure::Expired => {
                write!(f, "the verification code has expired, request a new one")
            }
            VerificationFailure::Mismatch => write!(f, "the verification code is not correct"),
        }
    }
}

/// Errors that stop a submission from being accepted.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum IntakeError {
    /// A required field is missing.
    Validation { field: &'static str },
    InvalidChoice { field: &'static str, value: String },
    WrongItemCount { expected: usize, found: usize },
    ScoreOutOfRange { code: &'static str, score: u8 },
    /// The identity already reached the participation limit.
    QuotaExceeded { limit: usize },
    Verification(VerificationFailure),
}

impl Error for IntakeError {}

impl Display for IntakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntakeError::Validation { field } => {
                write!(f, "the field '{}' is required", field)
            }
            IntakeError::InvalidChoice { field, value } => {
                write!(f, "'{}' is not a valid choice for '{}'", value, field)
            }
            IntakeError::WrongItemCount { expected, found } => {
                write!(f, "expected {} item scores, got {}", expected, found)
            }
            IntakeError::ScoreOutOfRange { code, score } => write!(
                f,
                "score {} for {} is outside of {}..={}",
                score, code, MIN_SCORE, MAX_SCORE
            ),
            IntakeError::QuotaExceeded { limit } => write!(
                f,
                "this identity has already participated {} times, no further submission is accepted",
                limit
            ),
            IntakeError::Verification(failure) => write!(f, "verification failed: {}", failure),
        }
    }
}
