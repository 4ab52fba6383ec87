/// Outcome of a password entry on the admin view.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum AccessOutcome {
    Granted,
    /// A non-empty, wrong password.
    Denied,
    /// Nothing was entered: neither the data nor an error is shown.
    NoInput,
}

/// Access check against a single shared password.
///
/// The password is compared verbatim: no trimming, case-sensitive.
pub struct AdminGate {
    password: String,
}

impl AdminGate {
    pub fn new(password: &str) -> AdminGate {
        AdminGate {
            password: password.to_string(),
        }
    }

    pub fn check(&self, input: &str) -> AccessOutcome {
        if input.is_empty() {
            AccessOutcome::NoInput
        } else if input == self.password {
            AccessOutcome::Granted
        } else {
            AccessOutcome::Denied
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbatim_comparison() {
        let gate = AdminGate::new("s3cret");
        assert_eq!(gate.check("s3cret"), AccessOutcome::Granted);
        assert_eq!(gate.check("S3CRET"), AccessOutcome::Denied);
        assert_eq!(gate.check(" s3cret"), AccessOutcome::Denied);
        assert_eq!(gate.check(""), AccessOutcome::NoInput);
    }
}
