//! Remote document shapes
//!
//! Document ids, field layouts and record decoding for the five attendance
//! collections.
//!
//! ```text
//! attendance_names   {division}_{gender}_names_{uid}    { names: [..] }
//! attendance_titles  {division}_{gender}_titles_{uid}   { titles: [..] }
//! attendance_info    {division}_{gender}_info_{uid}     { ..info keys }
//! attendance_dates   {division}_{gender}_date_{uid}     { date: ".." }
//! attendance_data    {division}_{gender}_{name}_{uid}   { name, keterangan, signatureUrl, .. }
//! ```
//!
//! Every document also carries `division`, `gender`, `userId`, `userEmail`
//! and the server-assigned `updatedAt`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};

use super::{Fields, RemoteDocument};
use crate::shared::error::{Result, SyncError};
use crate::shared::model::{
    Bucket, BucketValue, InfoRecord, Millis, Scope, SignatureEntry, SignatureMap, SyncRecord,
    RESERVED_INFO_KEYS,
};
use crate::shared::user::SessionUser;

/// Id of the per-user document holding a non-signature bucket
pub fn document_id(bucket: Bucket, scope: Scope, uid: &str) -> String {
    format!("{}_{}_{}_{}", scope.division, scope.gender, bucket.as_str(), uid)
}

/// Id of a person's signature document
pub fn signature_document_id(scope: Scope, name: &str, uid: &str) -> String {
    let name: String = name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    format!("{}_{}_{}_{}", scope.division, scope.gender, name, uid)
}

/// Non-alphanumerics replaced by `_`
fn safe_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Storage path of an uploaded signature image
pub fn signature_image_path(uid: &str, scope: Scope, name: &str, at: Millis) -> String {
    format!(
        "signatures/{}/{}/{}/signature_{}_{}.png",
        uid,
        scope.division,
        scope.gender,
        at,
        safe_name(name)
    )
}

fn envelope(scope: Scope, user: &SessionUser) -> Fields {
    let mut fields = Fields::new();
    fields.insert("division".into(), json!(scope.division.as_str()));
    fields.insert("gender".into(), json!(scope.gender.as_str()));
    fields.insert("userId".into(), json!(user.uid));
    fields.insert("userEmail".into(), json!(user.email));
    fields
}

/// Fields pushed for a non-signature bucket value
///
/// Info keys are spread at the top level, so reserved metadata keys in the
/// record are dropped rather than allowed to shadow the envelope.
pub fn record_fields(scope: Scope, value: &BucketValue, user: &SessionUser) -> Result<Fields> {
    let mut fields = envelope(scope, user);
    match value {
        BucketValue::Names(names) => {
            fields.insert("names".into(), json!(names));
        }
        BucketValue::Titles(titles) => {
            fields.insert("titles".into(), json!(titles));
        }
        BucketValue::Date(date) => {
            fields.insert("date".into(), json!(date));
        }
        BucketValue::Info(info) => {
            for (key, value) in info {
                if !RESERVED_INFO_KEYS.contains(&key.as_str()) {
                    fields.insert(key.clone(), json!(value));
                }
            }
        }
        BucketValue::Signatures(_) => {
            return Err(SyncError::validation(
                "bucket",
                "signatures are pushed one document per person",
            ))
        }
    }
    Ok(fields)
}

/// Fields pushed for one person's signature, before any image reference
pub fn signature_fields(
    scope: Scope,
    name: &str,
    entry: &SignatureEntry,
    user: &SessionUser,
    app_version: &str,
) -> Fields {
    let mut fields = envelope(scope, user);
    fields.insert("name".into(), json!(name.trim()));
    fields.insert("keterangan".into(), json!(entry.keterangan));
    fields.insert("localTimestamp".into(), json!(chrono::Utc::now().to_rfc3339()));
    fields.insert("appVersion".into(), json!(app_version));
    fields.insert("hasImage".into(), json!(!entry.image.is_empty()));
    fields
}

fn string_list(doc: &RemoteDocument, bucket: Bucket, field: &str) -> Result<Vec<String>> {
    let values = doc
        .fields
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| SyncError::malformed(bucket, format!("missing field '{}'", field)))?;
    values
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| SyncError::malformed(bucket, format!("non-string entry in '{}'", field)))
        })
        .collect()
}

fn info_record(doc: &RemoteDocument) -> InfoRecord {
    doc.fields
        .iter()
        .filter(|(key, _)| !RESERVED_INFO_KEYS.contains(&key.as_str()))
        .filter_map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Null => return None,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => other.to_string(),
            };
            Some((key.clone(), value))
        })
        .collect()
}

/// Decode a non-signature document into a sync record
pub fn decode_record(bucket: Bucket, scope: Scope, doc: &RemoteDocument) -> Result<SyncRecord> {
    let value = match bucket {
        Bucket::Names => BucketValue::Names(string_list(doc, bucket, "names")?),
        Bucket::Titles => BucketValue::Titles(string_list(doc, bucket, "titles")?),
        Bucket::Info => BucketValue::Info(info_record(doc)),
        Bucket::Date => match doc.str_field("date") {
            Some(date) if !date.is_empty() => BucketValue::Date(date.to_string()),
            _ => return Err(SyncError::malformed(bucket, "missing field 'date'")),
        },
        Bucket::Signatures => {
            return Err(SyncError::malformed(
                bucket,
                "signature documents are flattened, not decoded singly",
            ))
        }
    };

    Ok(SyncRecord {
        scope,
        value,
        user_id: doc.str_field("userId").map(str::to_string),
        user_email: doc.str_field("userEmail").map(str::to_string),
        updated_at: doc.updated_at(),
    })
}

/// Name and entry of one signature document, `None` when it has no name
pub fn decode_signature(doc: &RemoteDocument) -> Option<(String, SignatureEntry)> {
    let name = doc.str_field("name")?.trim();
    if name.is_empty() {
        return None;
    }
    let image = [doc.str_field("signatureDataUrl"), doc.str_field("signatureUrl")]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .unwrap_or_default();
    let keterangan = doc.str_field("keterangan").unwrap_or_default();
    Some((name.to_string(), SignatureEntry::new(image, keterangan)))
}

/// Most recent document by `updatedAt`, ties going to the greatest id
pub fn select_latest(documents: &[RemoteDocument]) -> Option<&RemoteDocument> {
    documents
        .iter()
        .max_by(|a, b| (a.updated_at(), &a.id).cmp(&(b.updated_at(), &b.id)))
}

/// Collapse a scope's signature documents into one map
///
/// When several documents name the same person, the newest non-empty value
/// of each field wins.
pub fn flatten_signatures(documents: &[RemoteDocument]) -> SignatureMap {
    let mut ordered: Vec<&RemoteDocument> = documents.iter().collect();
    ordered.sort_by(|a, b| (b.updated_at(), &b.id).cmp(&(a.updated_at(), &a.id)));

    let mut signatures = SignatureMap::new();
    for doc in ordered {
        if let Some((name, entry)) = decode_signature(doc) {
            signatures.entry(name).or_default().fill_forward(&entry);
        }
    }
    signatures
}

/// Decoded `data:` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    /// Decode a base64 `data:` URL; `Ok(None)` for anything else
    pub fn from_data_url(image: &str) -> Result<Option<Self>> {
        let Some(rest) = image.strip_prefix("data:") else {
            return Ok(None);
        };
        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| SyncError::validation("image", "data URL has no payload"))?;
        let content_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| SyncError::validation("image", "only base64 data URLs are supported"))?;
        let bytes = STANDARD
            .decode(data.trim())
            .map_err(|e| SyncError::validation("image", format!("invalid base64: {}", e)))?;
        Ok(Some(Self {
            content_type: if content_type.is_empty() {
                "image/png".to_string()
            } else {
                content_type.to_string()
            },
            bytes,
        }))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
