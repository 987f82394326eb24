//! Attendance Data Model
//!
//! Types for the data partitions ("scopes") and the five data buckets that
//! are mirrored between the local cache and the remote document store.
//!
//! # Storage Layout
//!
//! Every bucket value lives under `{division}_{gender}_{suffix}`:
//!
//! | Bucket       | Suffix             | Remote collection   |
//! |--------------|--------------------|---------------------|
//! | names        | `attendanceNames`  | `attendance_names`  |
//! | titles       | `reportTitles`     | `attendance_titles` |
//! | info         | `attendanceInfo`   | `attendance_info`   |
//! | date         | `tanggalPresensi`  | `attendance_dates`  |
//! | signatures   | `spreadsheetData`  | `attendance_data`   |
//!
//! The date is stored as a raw string, every other bucket as JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::shared::error::{Result, SyncError};

/// Milliseconds since the Unix epoch
pub type Millis = i64;

/// Storage key holding the active division
pub const CURRENT_DIVISION_KEY: &str = "currentDivision";
/// Storage key holding the active gender
pub const CURRENT_GENDER_KEY: &str = "currentGender";
/// Storage key holding the last session blob
pub const CURRENT_USER_KEY: &str = "currentUser";

/// Metadata keys that never belong to an info record
pub const RESERVED_INFO_KEYS: [&str; 5] = ["userId", "userEmail", "updatedAt", "division", "gender"];

/// Current wall-clock time in epoch millis
pub fn now_millis() -> Millis {
    chrono::Utc::now().timestamp_millis()
}

/// Storage key for a user's profile blob
pub fn profile_key(email: &str) -> String {
    format!("user_profile_{}", email)
}

/// Organisational division
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Division {
    Khusus,
    Sekum,
    Bendum,
    #[serde(rename = "PSDM")]
    Psdm,
    Syidak,
    #[serde(rename = "DKMA")]
    Dkma,
    #[serde(rename = "JWR")]
    Jwr,
}

impl Division {
    pub const ALL: [Division; 7] = [
        Division::Khusus,
        Division::Sekum,
        Division::Bendum,
        Division::Psdm,
        Division::Syidak,
        Division::Dkma,
        Division::Jwr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Division::Khusus => "Khusus",
            Division::Sekum => "Sekum",
            Division::Bendum => "Bendum",
            Division::Psdm => "PSDM",
            Division::Syidak => "Syidak",
            Division::Dkma => "DKMA",
            Division::Jwr => "JWR",
        }
    }
}

impl fmt::Display for Division {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Division {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Division::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| SyncError::validation("division", format!("unknown division '{}'", s)))
    }
}

/// Gender partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Gender {
    Ikhwan,
    Akhwat,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Ikhwan, Gender::Akhwat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Ikhwan => "Ikhwan",
            Gender::Akhwat => "Akhwat",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Gender::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| SyncError::validation("gender", format!("unknown gender '{}'", s)))
    }
}

/// A (division, gender) data partition
///
/// Exactly one scope is current at a time; it defaults to `Khusus/Ikhwan`
/// when nothing has been selected yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub division: Division,
    pub gender: Gender,
}

impl Default for Scope {
    fn default() -> Self {
        Self {
            division: Division::Khusus,
            gender: Gender::Ikhwan,
        }
    }
}

impl Scope {
    pub fn new(division: Division, gender: Gender) -> Self {
        Self { division, gender }
    }

    /// All 14 scopes
    pub fn all() -> impl Iterator<Item = Scope> {
        Division::ALL
            .into_iter()
            .flat_map(|division| Gender::ALL.into_iter().map(move |gender| Scope { division, gender }))
    }

    /// Local storage key of a bucket within this scope
    pub fn storage_key(&self, bucket: Bucket) -> String {
        format!("{}_{}_{}", self.division, self.gender, bucket.storage_suffix())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.division, self.gender)
    }
}

/// Category of attendance data, each with its own merge policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Names,
    Titles,
    Info,
    Date,
    Signatures,
}

impl Bucket {
    pub const ALL: [Bucket; 5] = [
        Bucket::Names,
        Bucket::Titles,
        Bucket::Info,
        Bucket::Date,
        Bucket::Signatures,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Names => "names",
            Bucket::Titles => "titles",
            Bucket::Info => "info",
            Bucket::Date => "date",
            Bucket::Signatures => "signatures",
        }
    }

    pub fn storage_suffix(&self) -> &'static str {
        match self {
            Bucket::Names => "attendanceNames",
            Bucket::Titles => "reportTitles",
            Bucket::Info => "attendanceInfo",
            Bucket::Date => "tanggalPresensi",
            Bucket::Signatures => "spreadsheetData",
        }
    }

    /// Remote collection holding this bucket
    pub fn collection(&self) -> &'static str {
        match self {
            Bucket::Names => "attendance_names",
            Bucket::Titles => "attendance_titles",
            Bucket::Info => "attendance_info",
            Bucket::Date => "attendance_dates",
            Bucket::Signatures => "attendance_data",
        }
    }

    /// Name of the UI event fired when this bucket changes
    pub fn event_name(&self) -> &'static str {
        match self {
            Bucket::Names => "namesUpdate",
            Bucket::Titles => "titlesUpdate",
            Bucket::Info => "infoUpdate",
            Bucket::Date => "dateUpdate",
            Bucket::Signatures => "signaturesUpdate",
        }
    }

    /// Bucket whose storage key ends with the given key's suffix
    pub fn from_storage_key(key: &str) -> Option<Bucket> {
        Bucket::ALL.into_iter().find(|bucket| {
            key.strip_suffix(bucket.storage_suffix())
                .is_some_and(|prefix| prefix.ends_with('_'))
        })
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Bucket::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| SyncError::validation("bucket", format!("unknown bucket '{}'", s)))
    }
}

/// A person's signature and annotation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    /// Data URL or remote URL, possibly empty
    #[serde(default)]
    pub image: String,
    /// Free-form annotation, possibly empty
    #[serde(default)]
    pub keterangan: String,
}

impl SignatureEntry {
    pub fn new(image: impl Into<String>, keterangan: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            keterangan: keterangan.into(),
        }
    }

    /// Fill empty fields from `incoming`; populated fields are never touched.
    ///
    /// Returns whether any field changed.
    pub fn fill_forward(&mut self, incoming: &SignatureEntry) -> bool {
        let mut changed = false;
        if self.image.is_empty() && !incoming.image.is_empty() {
            self.image = incoming.image.clone();
            changed = true;
        }
        if self.keterangan.is_empty() && !incoming.keterangan.is_empty() {
            self.keterangan = incoming.keterangan.clone();
            changed = true;
        }
        changed
    }
}

/// Signatures keyed by person name
pub type SignatureMap = BTreeMap<String, SignatureEntry>;

/// Free-form info record
pub type InfoRecord = BTreeMap<String, String>;

/// Value of one bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BucketValue {
    Names(Vec<String>),
    Titles(Vec<String>),
    Info(InfoRecord),
    Date(String),
    Signatures(SignatureMap),
}

impl BucketValue {
    /// Value of a bucket that has never been written
    pub fn empty(bucket: Bucket) -> Self {
        match bucket {
            Bucket::Names => BucketValue::Names(Vec::new()),
            Bucket::Titles => BucketValue::Titles(Vec::new()),
            Bucket::Info => BucketValue::Info(InfoRecord::new()),
            Bucket::Date => BucketValue::Date(String::new()),
            Bucket::Signatures => BucketValue::Signatures(SignatureMap::new()),
        }
    }

    pub fn bucket(&self) -> Bucket {
        match self {
            BucketValue::Names(_) => Bucket::Names,
            BucketValue::Titles(_) => Bucket::Titles,
            BucketValue::Info(_) => Bucket::Info,
            BucketValue::Date(_) => Bucket::Date,
            BucketValue::Signatures(_) => Bucket::Signatures,
        }
    }

    /// Encode for the local store
    pub fn to_stored(&self) -> Result<String> {
        Ok(match self {
            BucketValue::Names(names) => serde_json::to_string(names)?,
            BucketValue::Titles(titles) => serde_json::to_string(titles)?,
            BucketValue::Info(info) => serde_json::to_string(info)?,
            BucketValue::Date(date) => date.clone(),
            BucketValue::Signatures(signatures) => serde_json::to_string(signatures)?,
        })
    }

    /// Decode a local store value
    pub fn from_stored(bucket: Bucket, raw: &str) -> Result<Self> {
        Ok(match bucket {
            Bucket::Names => BucketValue::Names(serde_json::from_str(raw)?),
            Bucket::Titles => BucketValue::Titles(serde_json::from_str(raw)?),
            Bucket::Info => BucketValue::Info(serde_json::from_str(raw)?),
            Bucket::Date => BucketValue::Date(raw.to_string()),
            Bucket::Signatures => BucketValue::Signatures(serde_json::from_str(raw)?),
        })
    }
}

/// Remote envelope around a bucket value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRecord {
    pub scope: Scope,
    pub value: BucketValue,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    /// Server-assigned update time; 0 when the remote never stamped it
    pub updated_at: Millis,
}

impl SyncRecord {
    pub fn bucket(&self) -> Bucket {
        self.value.bucket()
    }
}
