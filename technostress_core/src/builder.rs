pub use crate::config::*;

/// A builder for assembling a form from raw text answers.
///
/// This is the entry point for front-ends that receive the answers as strings
/// (command line, web forms, spreadsheets).
///
/// ```
/// use technostress_core::builder::FormBuilder;
/// # use technostress_core::IntakeError;
///
/// let form = FormBuilder::new("student-42")
///     .demographics("Female", "18-21", "Computer Engineering", "High school", "University")?
///     .usage("6-10", "100+", "Social media", "Phone")?
///     .scores(&[3, 4, 2, 5, 3, 3, 4, 2, 1, 3, 4, 5])?
///     .build()?;
///
/// assert_eq!(form.demographics.gender, technostress_core::Gender::Female);
/// # Ok::<(), IntakeError>(())
/// ```
pub struct FormBuilder {
    pub(crate) _identity: String,
    pub(crate) _demographics: Option<Demographics>,
    pub(crate) _usage: Option<Usage>,
    pub(crate) _scores: Option<ItemScores>,
}

impl FormBuilder {
    pub fn new(identity: &str) -> FormBuilder {
        FormBuilder {
            _identity: identity.to_string(),
            _demographics: None,
            _usage: None,
            _scores: None,
        }
    }

    /// Sets the participant section. The department is free text and kept verbatim.
    pub fn demographics(
        self,
        gender: &str,
        age: &str,
        department: &str,
        mother_education: &str,
        father_education: &str,
    ) -> Result<FormBuilder, IntakeError> {
        let d = Demographics {
            gender: gender.parse()?,
            age: age.parse()?,
            department: department.to_string(),
            mother_education: mother_education.parse()?,
            father_education: father_education.parse()?,
        };
        Ok(FormBuilder {
            _demographics: Some(d),
            ..self
        })
    }

    pub fn usage(
        self,
        screen_time: &str,
        notification_count: &str,
        notification_type: &str,
        device: &str,
    ) -> Result<FormBuilder, IntakeError> {
        let u = Usage {
            screen_time: screen_time.parse()?,
            notification_count: notification_count.parse()?,
            notification_type: notification_type.parse()?,
            device: device.parse()?,
        };
        Ok(FormBuilder {
            _usage: Some(u),
            ..self
        })
    }

    /// The 12 scores, in questionnaire order (S1 first).
    pub fn scores(self, scores: &[u8]) -> Result<FormBuilder, IntakeError> {
        let s = ItemScores::new(scores)?;
        Ok(FormBuilder {
            _scores: Some(s),
            ..self
        })
    }

    /// Finishes the form. Every section must have been provided.
    ///
    /// The identity is checked later, when the submission is recorded.
    pub fn build(self) -> Result<FormSubmission, IntakeError> {
        Ok(FormSubmission {
            identity: self._identity,
            demographics: self
                ._demographics
                .ok_or(IntakeError::Validation {
                    field: "demographics",
                })?,
            usage: self
                ._usage
                .ok_or(IntakeError::Validation { field: "usage" })?,
            scores: self
                ._scores
                .ok_or(IntakeError::Validation { field: "scores" })?,
        })
    }
}
