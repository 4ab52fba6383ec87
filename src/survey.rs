use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};
use technostress_core::admin::{AccessOutcome, AdminGate};
use technostress_core::verification::{PendingCode, VerificationSession};
use technostress_core::*;

use std::fs;
use std::io::BufRead;

use chrono::{NaiveDateTime, Utc};
use rand::Rng;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::survey::config_reader::*;
use crate::survey::io_common::*;
use crate::survey::io_csv::CsvStore;
use crate::survey::mailer::{verification_message, Mailer};
use crate::survey::report::*;

pub mod config_reader;
pub mod io_common;
pub mod io_csv;
pub mod mailer;
pub mod report;

/// Failed verification attempts accepted before the submission is abandoned.
const MAX_VERIFICATION_ATTEMPTS: usize = 3;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SurveyError {
    #[snafu(context(false), display("{source}"))]
    Intake { source: IntakeError },

    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error writing the summary to {path}"))]
    WritingSummary {
        source: std::io::Error,
        path: String,
    },

    #[snafu(display("Cannot open the response store {path}"))]
    StoreOpen {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Cannot read the response store {path}"))]
    StoreRead { source: csv::Error, path: String },
    #[snafu(display("The response store {path} does not have the expected columns"))]
    StoreHeader { path: String },
    #[snafu(display("Malformed row {lineno} in the response store: {reason}"))]
    StoreRow { lineno: u64, reason: String },
    #[snafu(display("Cannot encode the response"))]
    StoreEncode { source: csv::Error },
    #[snafu(display("Cannot write to the response store {path}, the response was not recorded"))]
    StoreWrite {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("The response store {path} is busy, please try again"))]
    StoreLocked { path: String },

    #[snafu(display("Could not send the verification email to {to}: {reason}"))]
    Delivery { to: String, reason: String },

    #[snafu(display("Configuration error: {message}"))]
    Configuration { message: String },
    #[snafu(display("Wrong password, unauthorized access"))]
    AccessDenied {},
    #[snafu(display("Error reading the standard input"))]
    ReadingInput { source: std::io::Error },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type SurveyResult<T> = Result<T, SurveyError>;

/// The single access point to the persisted responses.
///
/// Readers call `load_all` directly. The read-check-append sequence of a
/// submission runs inside `with_write_lock` so that two submissions cannot both
/// pass the participation check before either is written.
pub trait ResponseStore {
    fn load_all(&self) -> SurveyResult<Vec<ResponseRecord>>;

    fn append(&self, record: &ResponseRecord) -> SurveyResult<()>;

    fn with_write_lock<T, F>(&self, f: F) -> SurveyResult<T>
    where
        F: FnOnce(&Self) -> SurveyResult<T>;
}

/// Checks a submission against the store and appends it, under the store lock.
pub fn record_submission<S: ResponseStore>(
    store: &S,
    form: &FormSubmission,
    timestamp: NaiveDateTime,
) -> SurveyResult<ResponseRecord> {
    store.with_write_lock(|s| {
        let existing = s.load_all()?;
        let record = match prepare_record(form, &existing, timestamp) {
            Ok(r) => r,
            Err(e) => {
                warn!("record_submission: submission rejected: {}", e);
                return Err(e.into());
            }
        };
        s.append(&record)?;
        info!(
            "record_submission: response recorded ({} record(s) in store)",
            existing.len() + 1
        );
        Ok(record)
    })
}

/// Sends a code to the address and reads answers from `input` until the address is verified.
///
/// `input` accepts either a code or `resend`. The session only changes after a
/// successful delivery.
pub fn verify_email<R: BufRead, G: Rng>(
    session: &mut VerificationSession,
    mailer: &dyn Mailer,
    address: &str,
    input: &mut R,
    rng: &mut G,
) -> SurveyResult<()> {
    let pending = PendingCode::generate(address, Utc::now(), rng);
    deliver_code(session, mailer, pending)?;

    let mut failures = 0;
    loop {
        println!("Enter the 6-digit code sent to {} (or 'resend'):", address);
        let mut line = String::new();
        let n = input.read_line(&mut line).context(ReadingInputSnafu {})?;
        if n == 0 {
            whatever!("Verification aborted: no code entered");
        }
        let answer = line.trim();
        if answer.eq_ignore_ascii_case("resend") {
            let pending = session
                .resend(Utc::now())
                .map_err(IntakeError::Verification)?;
            deliver_code(session, mailer, pending)?;
            continue;
        }
        match session.verify(address, answer, Utc::now()) {
            Result::Ok(()) => {
                println!("Email address verified.");
                return Ok(());
            }
            Result::Err(failure) => {
                failures += 1;
                warn!(
                    "verify_email: attempt {} failed: {}",
                    failures, failure
                );
                println!("{}", failure);
                if failures >= MAX_VERIFICATION_ATTEMPTS {
                    return Err(IntakeError::Verification(failure).into());
                }
            }
        }
    }
}

fn deliver_code(
    session: &mut VerificationSession,
    mailer: &dyn Mailer,
    pending: PendingCode,
) -> SurveyResult<()> {
    let (subject, body) = verification_message(&pending);
    mailer.send(&pending.address, &subject, &body)?;
    println!("A verification code was sent to {}.", pending.address);
    session.record_sent(pending);
    Ok(())
}

/// The submission flow of one participant.
///
/// The identity is checked first, then the participation limit is checked without
/// the lock so that no code is sent for a submission that would be refused anyway.
/// The authoritative check happens again when recording.
pub fn run_submission<R: BufRead>(
    settings: &Settings,
    capabilities: &Capabilities,
    form: &FormSubmission,
    email: Option<&str>,
    input: &mut R,
) -> SurveyResult<ResponseRecord> {
    let identity = hash_identity(&form.identity)?;
    let store = CsvStore::new(&settings.store_path, settings.lock_timeout);
    let prior = check_participation(&store.load_all()?, &identity)?;
    debug!("run_submission: {} prior submission(s)", prior);

    if settings.verification_required {
        let mailer = capabilities
            .mailer
            .as_deref()
            .context(ConfigurationSnafu {
                message: "email verification is required but no email sender is configured",
            })?;
        let address = match email {
            Some(a) if !a.trim().is_empty() => a,
            _ => return Err(IntakeError::Validation { field: "email" }.into()),
        };
        let mut session = VerificationSession::new();
        verify_email(
            &mut session,
            mailer,
            address,
            input,
            &mut rand::thread_rng(),
        )?;
    }

    record_submission(&store, form, now_timestamp())
}

/// The admin view.
pub fn run_report(
    settings: &Settings,
    password: &str,
    show_records: bool,
    out: Option<String>,
    reference: Option<String>,
) -> SurveyResult<()> {
    let admin_password = settings
        .admin_password
        .as_deref()
        .context(ConfigurationSnafu {
            message: "no admin password configured",
        })?;
    match AdminGate::new(admin_password).check(password) {
        AccessOutcome::NoInput => {
            info!("run_report: no password entered");
            return Ok(());
        }
        AccessOutcome::Denied => {
            warn!("run_report: wrong admin password");
            return AccessDeniedSnafu {}.fail();
        }
        AccessOutcome::Granted => {
            println!("Admin access granted.");
        }
    }

    let store = CsvStore::new(&settings.store_path, settings.lock_timeout);
    let records = store.load_all()?;
    let summary = summarize(&records);

    match &summary {
        Some(s) => {
            print!("{}", render_summary(s));
            if show_records {
                print!("{}", render_records(&records));
            }
        }
        None => println!("No data yet."),
    }

    let summary_js = summary_to_json(summary.as_ref());
    let pretty_js_stats = serde_json::to_string_pretty(&summary_js).context(ParsingJsonSnafu {})?;

    match out.as_deref() {
        Some("stdout") => println!("{}", pretty_js_stats),
        Some("") | None => {}
        Some(path) => {
            fs::write(path, &pretty_js_stats).context(WritingSummarySnafu { path })?;
            info!("run_report: summary written to {}", path);
        }
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = reference {
        let summary_ref = read_summary(&summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }

    Ok(())
}

pub fn read_summary(path: &str) -> SurveyResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})
}

pub fn run_questions() {
    print!("{}", render_questionnaire());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::io_csv::HEADER;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn form(identity: &str, gender: &str, score: u8) -> FormSubmission {
        technostress_core::builder::FormBuilder::new(identity)
            .demographics(gender, "22-26", "Management Information Systems", "High school", "Primary school")
            .and_then(|b| b.usage("6-10", "61-100", "Social media", "Phone"))
            .and_then(|b| b.scores(&[score; NUM_ITEMS]))
            .and_then(|b| b.build())
            .unwrap()
    }

    fn settings(dir: &TempDir) -> Settings {
        Settings {
            store_path: dir.path().join("responses.csv"),
            admin_password: Some("s3cret".to_string()),
            lock_timeout: Duration::from_millis(200),
            verification_required: false,
        }
    }

    fn store_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    /// Keeps the sent messages instead of delivering them.
    #[derive(Default)]
    struct RecordingMailer {
        sent: RefCell<Vec<(String, String, String)>>,
    }

    impl RecordingMailer {
        fn last_code(&self) -> String {
            let sent = self.sent.borrow();
            let body = &sent.last().unwrap().2;
            body.split_whitespace()
                .find(|w| w.len() == 6 && w.chars().all(|c| c.is_ascii_digit()))
                .unwrap()
                .to_string()
        }
    }

    impl Mailer for RecordingMailer {
        fn send(&self, to: &str, subject: &str, body: &str) -> SurveyResult<()> {
            self.sent
                .borrow_mut()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    struct FailingMailer;

    impl Mailer for FailingMailer {
        fn send(&self, to: &str, _subject: &str, _body: &str) -> SurveyResult<()> {
            DeliverySnafu {
                to,
                reason: "relay unreachable",
            }
            .fail()
        }
    }

    #[test]
    fn two_submissions_then_quota() {
        init();
        let dir = tempdir().unwrap();
        let s = settings(&dir);
        let caps = Capabilities::none();
        let f = form("  User@Example.com ", "Female", 3);
        let mut no_input = Cursor::new(Vec::new());

        let r1 = run_submission(&s, &caps, &f, None, &mut no_input).unwrap();
        assert_eq!(r1.average, 3.0);
        assert_eq!(r1.level, StressLevel::Medium);
        run_submission(&s, &caps, &form("user@example.com", "Female", 4), None, &mut no_input)
            .unwrap();
        let before = store_lines(&s.store_path);
        assert_eq!(before.len(), 3);

        let third = run_submission(&s, &caps, &f, None, &mut no_input);
        assert!(matches!(
            third,
            Err(SurveyError::Intake {
                source: IntakeError::QuotaExceeded { limit: 2 }
            })
        ));
        assert_eq!(store_lines(&s.store_path), before);
    }

    #[test]
    fn appends_preserve_previous_rows() {
        init();
        let dir = tempdir().unwrap();
        let s = settings(&dir);
        let store = CsvStore::new(&s.store_path, s.lock_timeout);
        let mut snapshots: Vec<Vec<String>> = Vec::new();
        for i in 0..5u8 {
            let f = form(&format!("participant-{}", i), "Male", 1 + i % 5);
            record_submission(&store, &f, now_timestamp()).unwrap();
            let lines = store_lines(&s.store_path);
            assert_eq!(lines.len(), usize::from(i) + 2);
            assert_eq!(lines[0], HEADER.join(","));
            if let Some(prev) = snapshots.last() {
                assert_eq!(&lines[..prev.len()], prev.as_slice());
            }
            snapshots.push(lines);
        }
        assert_eq!(store.load_all().unwrap().len(), 5);
    }

    #[test]
    fn empty_identity_writes_nothing() {
        let dir = tempdir().unwrap();
        let s = settings(&dir);
        let res = run_submission(
            &s,
            &Capabilities::none(),
            &form("   ", "Male", 3),
            None,
            &mut Cursor::new(Vec::new()),
        );
        assert!(matches!(
            res,
            Err(SurveyError::Intake {
                source: IntakeError::Validation { field: "identity" }
            })
        ));
        assert!(!s.store_path.exists());
    }

    #[test]
    fn lock_held_elsewhere_times_out() {
        let dir = tempdir().unwrap();
        let s = settings(&dir);
        let store = CsvStore::new(&s.store_path, s.lock_timeout);
        let mut lock_path: PathBuf = s.store_path.clone();
        lock_path.set_extension("csv.lock");
        fs::write(&lock_path, "other process").unwrap();

        let res = record_submission(&store, &form("x", "Male", 3), now_timestamp());
        assert!(matches!(res, Err(SurveyError::StoreLocked { .. })));
        assert!(!s.store_path.exists());

        fs::remove_file(&lock_path).unwrap();
        record_submission(&store, &form("x", "Male", 3), now_timestamp()).unwrap();
        assert!(!lock_path.exists());
    }

    #[test]
    fn concurrent_submitters_respect_the_limit() {
        init();
        let dir = tempdir().unwrap();
        let path = dir.path().join("responses.csv");
        let f = form("same@x.org", "Female", 4);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let path = path.clone();
                let f = f.clone();
                std::thread::spawn(move || {
                    let store = CsvStore::new(&path, Duration::from_secs(5));
                    // SurveyError is not Send, keep only the intake error.
                    match record_submission(&store, &f, now_timestamp()) {
                        Result::Ok(_) => Ok(()),
                        Result::Err(SurveyError::Intake { source }) => Err(Some(source)),
                        Result::Err(_) => Err(None),
                    }
                })
            })
            .collect();
        let results: Vec<Result<(), Option<IntakeError>>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let accepted = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(accepted, MAX_PARTICIPATION);
        for r in results.iter().filter(|r| r.is_err()) {
            assert!(matches!(
                r,
                Err(Some(IntakeError::QuotaExceeded { .. }))
            ));
        }
        let store = CsvStore::new(&path, Duration::from_secs(5));
        assert_eq!(store.load_all().unwrap().len(), MAX_PARTICIPATION);
        assert_eq!(store_lines(&path).len(), MAX_PARTICIPATION + 1);
    }

    #[test]
    fn abandoned_lock_does_not_block_submissions() {
        init();
        let dir = tempdir().unwrap();
        let s = settings(&dir);
        let store = CsvStore::new(&s.store_path, s.lock_timeout);
        let mut lock_path: PathBuf = s.store_path.clone();
        lock_path.set_extension("csv.lock");
        // Left behind by a process killed while holding the lock.
        fs::write(&lock_path, "999999\n").unwrap();
        fs::File::options()
            .write(true)
            .open(&lock_path)
            .unwrap()
            .set_modified(std::time::SystemTime::now() - Duration::from_secs(600))
            .unwrap();

        record_submission(&store, &form("x", "Male", 3), now_timestamp()).unwrap();
        assert_eq!(store_lines(&s.store_path).len(), 2);
        assert!(!lock_path.exists());
    }

    #[test]
    fn verification_with_retry_and_resend() {
        init();
        let code = PendingCode::generate("x", Utc::now(), &mut StdRng::seed_from_u64(9)).code;
        let wrong = if code == "123456" { "654321" } else { "123456" };
        let mut input = Cursor::new(format!("{}\nresend\n{}\n", wrong, code).into_bytes());
        let mailer = RecordingMailer::default();
        let mut session = VerificationSession::new();

        verify_email(
            &mut session,
            &mailer,
            "Student@Uni.edu",
            &mut input,
            &mut StdRng::seed_from_u64(9),
        )
        .unwrap();
        assert!(session.is_verified("student@uni.edu"));

        let sent = mailer.sent.borrow();
        assert_eq!(sent.len(), 2);
        // Delivered to the address as typed.
        assert_eq!(sent[0].0, "Student@Uni.edu");
        // The resend carries the same code.
        assert_eq!(mailer.last_code(), code);
        assert!(sent[0].2.contains(&code));
    }

    #[test]
    fn too_many_wrong_codes() {
        let mailer = RecordingMailer::default();
        let mut session = VerificationSession::new();
        let res = verify_email(
            &mut session,
            &mailer,
            "x@uni.edu",
            &mut Cursor::new(b"1\n2\n3\n".to_vec()),
            &mut StdRng::seed_from_u64(1),
        );
        assert!(matches!(
            res,
            Err(SurveyError::Intake {
                source: IntakeError::Verification(VerificationFailure::Mismatch)
            })
        ));
        assert!(!session.is_verified("x@uni.edu"));
    }

    #[test]
    fn verification_requires_an_address() {
        let dir = tempdir().unwrap();
        let mut s = settings(&dir);
        s.verification_required = true;
        let caps = Capabilities {
            mailer: Some(Box::new(RecordingMailer::default())),
        };
        let res = run_submission(
            &s,
            &caps,
            &form("x", "Male", 3),
            Some("  "),
            &mut Cursor::new(Vec::new()),
        );
        assert!(matches!(
            res,
            Err(SurveyError::Intake {
                source: IntakeError::Validation { field: "email" }
            })
        ));
        assert!(!s.store_path.exists());
    }

    #[test]
    fn verification_required_without_sender_is_a_configuration_error() {
        let dir = tempdir().unwrap();
        let mut s = settings(&dir);
        s.verification_required = true;
        let res = run_submission(
            &s,
            &Capabilities::none(),
            &form("x", "Male", 3),
            Some("x@uni.edu"),
            &mut Cursor::new(Vec::new()),
        );
        assert!(matches!(res, Err(SurveyError::Configuration { .. })));
        assert!(!s.store_path.exists());
    }

    #[test]
    fn delivery_failure_leaves_session_untouched() {
        let mut session = VerificationSession::new();
        let res = verify_email(
            &mut session,
            &FailingMailer,
            "x@uni.edu",
            &mut Cursor::new(b"123456\n".to_vec()),
            &mut StdRng::seed_from_u64(3),
        );
        assert!(matches!(res, Err(SurveyError::Delivery { .. })));
        assert_eq!(session, VerificationSession::new());
    }

    #[test]
    fn report_access() {
        init();
        let dir = tempdir().unwrap();
        let s = settings(&dir);
        // Empty input shows nothing, even without a store.
        run_report(&s, "", false, None, None).unwrap();
        assert!(matches!(
            run_report(&s, "wrong", false, None, None),
            Err(SurveyError::AccessDenied {})
        ));
        // No store yet: no data, no error.
        run_report(&s, "s3cret", true, None, None).unwrap();
    }

    #[test]
    fn report_json_and_reference() {
        init();
        let dir = tempdir().unwrap();
        let s = settings(&dir);
        let caps = Capabilities::none();
        let mut no_input = Cursor::new(Vec::new());
        run_submission(&s, &caps, &form("f1", "Female", 5), None, &mut no_input).unwrap();
        run_submission(&s, &caps, &form("f2", "Female", 3), None, &mut no_input).unwrap();
        run_submission(&s, &caps, &form("m1", "Male", 1), None, &mut no_input).unwrap();

        let out = dir.path().join("summary.json");
        let out_s = out.display().to_string();
        run_report(&s, "s3cret", true, Some(out_s.clone()), None).unwrap();
        let js = read_summary(&out_s).unwrap();
        assert_eq!(js["participants"], 3);
        assert_eq!(js["overallMean"], 3.0);
        assert_eq!(js["genderCounts"]["Female"], 2);
        assert_eq!(js["meanByGender"]["Female"], 4.0);
        assert_eq!(js["meanByGender"]["Male"], 1.0);

        // The summary is its own reference.
        run_report(&s, "s3cret", false, None, Some(out_s.clone())).unwrap();

        run_submission(&s, &caps, &form("m2", "Male", 2), None, &mut no_input).unwrap();
        assert!(run_report(&s, "s3cret", false, None, Some(out_s)).is_err());
    }
}
