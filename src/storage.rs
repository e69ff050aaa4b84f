use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use nom::{
    bytes::complete::tag,
    multi::length_data,
    number::complete::{le_i32, le_i64, le_u16, le_u64, le_u8},
    sequence::tuple,
    IResult,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{RecordError, Result};
use crate::model::{self, Gender, MedicalHistory, PatientRecord};
use crate::{RecordStore, StoreConfig};

// File layout (little-endian):
//   [Magic "MREC"][Version u16][Count i32]
//   per record: [Id i32][Age i32][Gender u8][Admitted i64][Discharged i64, 0 = none]
//               [Flag u8][NameLen u64][Name][HistoryLen u64][History]
pub const MAGIC: &[u8; 4] = b"MREC";
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 2 + 4;
const RECORD_FIXED_LEN: usize = 4 + 4 + 1 + 8 + 8 + 1 + 8 + 8;

/// What a lenient load managed to recover.
#[derive(Debug)]
pub struct LoadReport {
    pub store: RecordStore,
    /// The error that stopped the load, if any. Records before it are kept.
    pub error: Option<RecordError>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

pub fn encode(store: &RecordStore) -> Result<Vec<u8>> {
    let body: usize = store
    .list(true)
    .map(|r| RECORD_FIXED_LEN + r.name.len() + r.medical_history.len())
    .sum();

    let mut buf = Vec::new();
    buf.try_reserve_exact(HEADER_LEN + body)?;

    let count = i32::try_from(store.len())
    .map_err(|_| RecordError::CapacityExceeded { max: i32::MAX as usize })?;

    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&count.to_le_bytes());

    for record in store.list(true) {
        buf.extend_from_slice(&record.id.to_le_bytes());
        buf.extend_from_slice(&i32::from(record.age).to_le_bytes());
        buf.push(record.gender.code());
        buf.extend_from_slice(&record.admission_timestamp.to_le_bytes());
        buf.extend_from_slice(&record.discharge_timestamp.unwrap_or(0).to_le_bytes());
        buf.push(u8::from(record.is_discharged));
        write_text(&mut buf, &record.name);
        write_text(&mut buf, record.medical_history.as_str());
    }

    Ok(buf)
}

fn write_text(buf: &mut Vec<u8>, text: &str) {
    buf.extend_from_slice(&(text.len() as u64).to_le_bytes());
    buf.extend_from_slice(text.as_bytes());
}

/// Strict decode: any failure discards everything decoded so far.
pub fn decode(bytes: &[u8], config: StoreConfig) -> Result<RecordStore> {
    let report = decode_lenient(bytes, config)?;
    match report.error {
        Some(e) => Err(e),
        None => Ok(report.store),
    }
}

/// Decodes record by record, committing each one only once it is complete
/// and valid. Stops at the first failure and returns the prefix.
pub fn decode_lenient(bytes: &[u8], config: StoreConfig) -> Result<LoadReport> {
    let mut store = RecordStore::with_config(config)?;

    let (mut rest, count) = match file_header(bytes) {
        Ok(v) => v,
        Err(e) => return Ok(LoadReport { store, error: Some(e) }),
    };

    for _ in 0..count {
        let offset = bytes.len() - rest.len();
        let step = record_frame(rest)
        .map_err(|e| nom_failure(bytes, e, "record"))
        .and_then(|(next, frame)| Ok((next, frame.into_record(offset)?)))
        .and_then(|(next, record)| store.push_loaded(record).map(|_| next));

        match step {
            Ok(next) => rest = next,
            Err(e) => return Ok(LoadReport { store, error: Some(e) }),
        }
    }

    let error = if rest.is_empty() {
        None
    } else {
        Some(RecordError::corrupt(
            bytes.len() - rest.len(),
            format!("{} trailing bytes after last record", rest.len()),
        ))
    };
    Ok(LoadReport { store, error })
}

fn file_header(bytes: &[u8]) -> Result<(&[u8], usize)> {
    let (rest, (_, version, count)) = tuple((tag(&MAGIC[..]), le_u16, le_i32))(bytes)
    .map_err(|e| nom_failure(bytes, e, "file header"))?;

    if version != FORMAT_VERSION {
        return Err(RecordError::corrupt(4, format!("unsupported format version {}", version)));
    }
    let count = usize::try_from(count)
    .map_err(|_| RecordError::corrupt(6, format!("negative record count {}", count)))?;
    Ok((rest, count))
}

struct RawRecord<'a> {
    id: i32,
    age: i32,
    gender: u8,
    admitted: i64,
    discharged: i64,
    flag: u8,
    name: &'a [u8],
    history: &'a [u8],
}

fn record_frame(input: &[u8]) -> IResult<&[u8], RawRecord<'_>> {
    let (input, (id, age, gender, admitted, discharged, flag)) =
    tuple((le_i32, le_i32, le_u8, le_i64, le_i64, le_u8))(input)?;
    let (input, name) = length_data(le_u64)(input)?;
    let (input, history) = length_data(le_u64)(input)?;

    Ok((input, RawRecord { id, age, gender, admitted, discharged, flag, name, history }))
}

impl RawRecord<'_> {
    fn into_record(self, offset: usize) -> Result<PatientRecord> {
        let bad = |reason: String| RecordError::corrupt(offset, reason);

        let id = model::validate_id(self.id).map_err(|e| bad(e.to_string()))?;
        let age = model::validate_age(self.age).map_err(|e| bad(e.to_string()))?;
        let gender = Gender::try_from(self.gender).map_err(|e| bad(e.to_string()))?;

        let is_discharged = match self.flag {
            0 => false,
            1 => true,
            other => return Err(bad(format!("invalid discharge flag {}", other))),
        };
        let discharge_timestamp = match (is_discharged, self.discharged) {
            (true, ts) => Some(ts),
            (false, 0) => None,
            (false, ts) => return Err(bad(format!("active record {} carries discharge time {}", id, ts))),
        };

        let name = owned_text(self.name, offset, "name")?;
        model::validate_name(&name).map_err(|e| bad(e.to_string()))?;
        let history = owned_text(self.history, offset, "medical history")?;

        Ok(PatientRecord {
            id,
            name,
            age,
            gender,
            medical_history: MedicalHistory::new(history),
            admission_timestamp: self.admitted,
            discharge_timestamp,
            is_discharged,
        })
    }
}

fn owned_text(bytes: &[u8], offset: usize, field: &str) -> Result<String> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(bytes.len())?;
    buf.extend_from_slice(bytes);
    String::from_utf8(buf)
    .map_err(|e| RecordError::corrupt(offset, format!("{} is not valid UTF-8: {}", field, e)))
}

fn nom_failure(whole: &[u8], err: nom::Err<nom::error::Error<&[u8]>>, what: &str) -> RecordError {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let offset = whole.len() - e.input.len();
            RecordError::corrupt(offset, format!("malformed {} ({:?})", what, e.code))
        }
        nom::Err::Incomplete(_) => RecordError::corrupt(whole.len(), format!("truncated {}", what)),
    }
}

/// Writes every record, active and discharged. The destination is replaced
/// in one rename; a failed save leaves the previous file in place.
pub fn save(store: &RecordStore, path: &Path) -> Result<()> {
    let bytes = encode(store)?;
    let tmp = temp_sibling(path);

    let written = (|| -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        writer.write_all(&bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    })()
    .and_then(|_| fs::rename(&tmp, path));

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    info!(records = store.len(), bytes = bytes.len(), path = %path.display(), "records saved");
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| "records".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4()))
}

/// Strict load. A missing file is a first run and yields an empty store.
pub fn load(path: &Path, config: StoreConfig) -> Result<RecordStore> {
    let report = load_lenient(path, config)?;
    match report.error {
        Some(e) => Err(e),
        None => Ok(report.store),
    }
}

/// Load that keeps the records committed before a decode failure.
pub fn load_lenient(path: &Path, config: StoreConfig) -> Result<LoadReport> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no saved records, starting empty");
            return Ok(LoadReport { store: RecordStore::with_config(config)?, error: None });
        }
        Err(e) => return Err(e.into()),
    };

    let report = decode_lenient(&bytes, config)?;
    match &report.error {
        None => info!(records = report.store.len(), path = %path.display(), "records loaded"),
        Some(e) => warn!(
            kept = report.store.len(),
            path = %path.display(),
            error = %e,
            "load stopped early"
        ),
    }
    Ok(report)
}
