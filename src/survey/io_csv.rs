// The CSV response store.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use csv::StringRecord;

use crate::survey::{io_common::*, *};

/// Columns of the store, in order. Must stay stable for the lifetime of a deployment.
pub const HEADER: [&str; 13 + NUM_ITEMS] = [
    "timestamp",
    "identity_hash",
    "gender",
    "age",
    "department",
    "mother_education",
    "father_education",
    "screen_time",
    "notification_count",
    "notification_type",
    "device",
    "average",
    "level",
    "S1",
    "S2",
    "S3",
    "S4",
    "S5",
    "S6",
    "S7",
    "S8",
    "S9",
    "S10",
    "S11",
    "S12",
];

const FIRST_SCORE_COL: usize = 13;
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(20);

pub struct CsvStore {
    path: PathBuf,
    lock_timeout: Duration,
}

/// Exclusive right to append to the store, held through a sidecar lock file.
///
/// The lock file is created with create-new semantics, so that only one process
/// at a time holds it. It is removed when the guard is dropped. A lock file left
/// behind by a process that died is considered stale once it is older than
/// `STALE_LOCK_FACTOR` times the lock timeout, and is then removed.
struct StoreLock {
    path: PathBuf,
}

/// A lock file older than this many lock timeouts is considered abandoned.
const STALE_LOCK_FACTOR: u32 = 10;

/// Age of the lock file, if it can be determined.
fn lock_age(path: &Path) -> Option<Duration> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| SystemTime::now().duration_since(t).ok())
}

impl StoreLock {
    fn acquire(path: PathBuf, timeout: Duration) -> SurveyResult<StoreLock> {
        let start = Instant::now();
        let stale_after = timeout.saturating_mul(STALE_LOCK_FACTOR);
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Result::Ok(mut f) => {
                    // The owner, reported when the lock is found stale.
                    let _ = writeln!(f, "{}", std::process::id());
                    debug!("StoreLock: acquired {:?}", path);
                    return Ok(StoreLock { path });
                }
                Result::Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if let Some(age) = lock_age(&path).filter(|age| *age > stale_after) {
                        let owner = std::fs::read_to_string(&path).unwrap_or_default();
                        warn!(
                            "StoreLock: removing stale lock {:?} (age {:?}, owner pid {:?})",
                            path,
                            age,
                            owner.trim()
                        );
                        match std::fs::remove_file(&path) {
                            Result::Ok(()) => continue,
                            // Someone else cleaned it up first.
                            Result::Err(e) if e.kind() == ErrorKind::NotFound => continue,
                            Result::Err(e) => {
                                return Err(e).context(StoreOpenSnafu {
                                    path: path.display().to_string(),
                                });
                            }
                        }
                    }
                    if start.elapsed() >= timeout {
                        warn!("StoreLock: {:?} still held after {:?}", path, timeout);
                        return StoreLockedSnafu {
                            path: path.display().to_string(),
                        }
                        .fail();
                    }
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Result::Err(e) => {
                    return Err(e).context(StoreOpenSnafu {
                        path: path.display().to_string(),
                    });
                }
            }
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("StoreLock: could not remove {:?}: {}", self.path, e);
        }
    }
}

impl CsvStore {
    pub fn new(path: &Path, lock_timeout: Duration) -> CsvStore {
        CsvStore {
            path: path.to_path_buf(),
            lock_timeout,
        }
    }

    fn path_str(&self) -> String {
        self.path.display().to_string()
    }

    fn lock_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.lock", self.path.display()))
    }

    /// Current size of the store in bytes, 0 when it does not exist yet.
    fn current_len(&self) -> SurveyResult<u64> {
        match std::fs::metadata(&self.path) {
            Result::Ok(m) => Ok(m.len()),
            Result::Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Result::Err(e) => Err(e).context(StoreOpenSnafu {
                path: self.path_str(),
            }),
        }
    }

    /// Opens a reader on an existing store and checks its header.
    ///
    /// Returns `None` when the store is missing or empty.
    fn open_reader(&self) -> SurveyResult<Option<csv::Reader<File>>> {
        if self.current_len()? == 0 {
            debug!("CsvStore: {:?} is missing or empty", self.path);
            return Ok(None);
        }
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .context(StoreReadSnafu {
                path: self.path_str(),
            })?;
        let header = rdr.headers().context(StoreReadSnafu {
            path: self.path_str(),
        })?;
        if header.iter().ne(HEADER.iter().copied()) {
            warn!("CsvStore: unexpected header {:?}", header);
            return StoreHeaderSnafu {
                path: self.path_str(),
            }
            .fail();
        }
        Ok(Some(rdr))
    }

    fn encode(record: &ResponseRecord, with_header: bool) -> SurveyResult<Vec<u8>> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        if with_header {
            wtr.write_record(HEADER).context(StoreEncodeSnafu {})?;
        }
        wtr.write_record(encode_row(record))
            .context(StoreEncodeSnafu {})?;
        wtr.into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))
            .context(StoreEncodeSnafu {})
    }
}

impl ResponseStore for CsvStore {
    fn load_all(&self) -> SurveyResult<Vec<ResponseRecord>> {
        let mut rdr = match self.open_reader()? {
            Some(r) => r,
            None => return Ok(Vec::new()),
        };
        let mut res: Vec<ResponseRecord> = Vec::new();
        for (idx, line_r) in rdr.records().enumerate() {
            // Line 1 is the header.
            let lineno = (idx + 2) as u64;
            let line = line_r.context(StoreReadSnafu {
                path: self.path_str(),
            })?;
            res.push(parse_row(lineno, &line)?);
        }
        debug!(
            "CsvStore: loaded {} record(s) from {}",
            res.len(),
            simplify_file_name(&self.path)
        );
        Ok(res)
    }

    fn append(&self, record: &ResponseRecord) -> SurveyResult<()> {
        let original_len = self.current_len()?;
        if original_len > 0 {
            // Refuse to add rows under foreign columns.
            self.open_reader()?;
        }
        let buf = CsvStore::encode(record, original_len == 0)?;

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context(StoreOpenSnafu {
                path: self.path_str(),
            })?;
        let written = f.write_all(&buf).and_then(|_| f.sync_data());
        if let Err(e) = written {
            // Do not leave a partial row behind.
            if let Err(e2) = f.set_len(original_len) {
                warn!(
                    "CsvStore: could not roll back {:?} to {} bytes: {}",
                    self.path, original_len, e2
                );
            }
            return Err(e).context(StoreWriteSnafu {
                path: self.path_str(),
            });
        }
        Ok(())
    }

    fn with_write_lock<T, F>(&self, f: F) -> SurveyResult<T>
    where
        F: FnOnce(&Self) -> SurveyResult<T>,
    {
        let _lock = StoreLock::acquire(self.lock_path(), self.lock_timeout)?;
        f(self)
    }
}

fn encode_row(record: &ResponseRecord) -> Vec<String> {
    let d = &record.demographics;
    let u = &record.usage;
    let mut row: Vec<String> = vec![
        format_timestamp(&record.timestamp),
        record.identity_hash.0.clone(),
        d.gender.to_string(),
        d.age.to_string(),
        d.department.clone(),
        d.mother_education.to_string(),
        d.father_education.to_string(),
        u.screen_time.to_string(),
        u.notification_count.to_string(),
        u.notification_type.to_string(),
        u.device.to_string(),
        record.average.to_string(),
        record.level.to_string(),
    ];
    row.extend(record.scores.as_slice().iter().map(|s| s.to_string()));
    row
}

fn parse_row(lineno: u64, line: &StringRecord) -> SurveyResult<ResponseRecord> {
    let row_err = |reason: String| StoreRowSnafu { lineno, reason }.build();
    if line.len() != HEADER.len() {
        return Err(row_err(format!(
            "expected {} columns, found {}",
            HEADER.len(),
            line.len()
        )));
    }
    // The length was checked above.
    let col = |i: usize| line.get(i).unwrap_or_default();
    let choice = |e: IntakeError| row_err(e.to_string());

    let timestamp = parse_timestamp(col(0))
        .ok_or_else(|| row_err(format!("invalid timestamp {:?}", col(0))))?;
    let demographics = Demographics {
        gender: col(2).parse().map_err(choice)?,
        age: col(3).parse().map_err(choice)?,
        department: col(4).to_string(),
        mother_education: col(5).parse().map_err(choice)?,
        father_education: col(6).parse().map_err(choice)?,
    };
    let usage = Usage {
        screen_time: col(7).parse().map_err(choice)?,
        notification_count: col(8).parse().map_err(choice)?,
        notification_type: col(9).parse().map_err(choice)?,
        device: col(10).parse().map_err(choice)?,
    };
    let average: f64 = col(11)
        .parse()
        .map_err(|_| row_err(format!("invalid average {:?}", col(11))))?;
    let level: StressLevel = col(12).parse().map_err(choice)?;

    let mut raw_scores: Vec<u8> = Vec::with_capacity(NUM_ITEMS);
    for i in FIRST_SCORE_COL..HEADER.len() {
        let s: u8 = col(i)
            .parse()
            .map_err(|_| row_err(format!("invalid score {:?} for {}", col(i), HEADER[i])))?;
        raw_scores.push(s);
    }
    let scores = ItemScores::new(&raw_scores).map_err(choice)?;

    Ok(ResponseRecord {
        timestamp,
        identity_hash: IdentityHash(col(1).to_string()),
        demographics,
        usage,
        scores,
        average,
        level,
    })
}
