//! Persistent store for tire replacement requests
use super::approval::{ApprovalStatus, StatusChange};
use super::error::RepositoryError;
use super::photo::PhotoReference;
use super::request::{RequestDetails, RequestId, TireReplacementRequest};
use super::utils;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, TransactionalTree};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const REQUESTS_TREE: &str = "requests";
const PHOTOS_TREE: &str = "photos";
const DEFAULT_EXTENSION: &str = "jpg";

/// An uploaded photo as received from the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl PhotoUpload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    fn extension(&self) -> String {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.len() <= 5)
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
    }
}

/// Capability the orchestrator needs from whatever holds the requests.
///
/// Implementations own the stored status: `apply_change` must re-run the
/// state machine against what is actually stored and refuse anything else.
pub trait RequestRepository {
    fn create(
        &self,
        details: RequestDetails,
        photos: &[PhotoUpload],
    ) -> Result<TireReplacementRequest, RepositoryError>;

    /// Replaces the details of a pending request. `None` keeps the current
    /// photo set, `Some` replaces it as a whole.
    fn update(
        &self,
        id: &RequestId,
        details: RequestDetails,
        photos: Option<&[PhotoUpload]>,
    ) -> Result<TireReplacementRequest, RepositoryError>;

    fn delete(&self, id: &RequestId) -> Result<(), RepositoryError>;

    fn get(&self, id: &RequestId) -> Result<TireReplacementRequest, RepositoryError>;

    fn list(&self) -> Result<Vec<TireReplacementRequest>, RepositoryError>;

    fn apply_change(
        &self,
        id: &RequestId,
        change: StatusChange,
    ) -> Result<TireReplacementRequest, RepositoryError>;

    /// Raw bytes behind a reference this store handed out, if it has them.
    fn photo(&self, reference: &PhotoReference) -> Result<Option<Vec<u8>>, RepositoryError>;
}

pub struct SledRepository {
    instance: Arc<sled::Db>,
    requests: sled::Tree,
    photos: sled::Tree,
}

impl SledRepository {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, RepositoryError> {
        let requests = instance.open_tree(REQUESTS_TREE)?;
        let photos = instance.open_tree(PHOTOS_TREE)?;
        Ok(Self {
            instance,
            requests,
            photos,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let db = sled::open(path)?;
        Self::new(Arc::new(db))
    }

    pub fn flush(&self) -> Result<(), RepositoryError> {
        self.instance.flush()?;
        Ok(())
    }

    fn load(&self, id: &RequestId) -> Result<(sled::IVec, TireReplacementRequest), RepositoryError> {
        let raw = self
            .requests
            .get(id.as_str().as_bytes())?
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;
        let request: TireReplacementRequest = minicbor::decode(&raw)?;
        Ok((raw, request))
    }

    /// Read-modify-write guarded by compare-and-swap. `modify` is re-run
    /// against the fresh value whenever another writer got there first.
    fn swap<F>(&self, id: &RequestId, mut modify: F) -> Result<TireReplacementRequest, RepositoryError>
    where
        F: FnMut(TireReplacementRequest) -> Result<TireReplacementRequest, RepositoryError>,
    {
        loop {
            let (raw, current) = self.load(id)?;
            let updated = modify(current)?;
            let encoded = minicbor::to_vec(&updated)?;

            match self
                .requests
                .compare_and_swap(id.as_str().as_bytes(), Some(raw), Some(encoded))?
            {
                Ok(()) => return Ok(updated),
                Err(_) => debug!(request_id = %id, "concurrent write, retrying"),
            }
        }
    }
}

impl RequestRepository for SledRepository {
    fn create(
        &self,
        details: RequestDetails,
        photos: &[PhotoUpload],
    ) -> Result<TireReplacementRequest, RepositoryError> {
        let id = utils::new_request_id().map_err(|err| RepositoryError::Codec(err.to_string()))?;
        let id = RequestId::new(id);
        let uploads = stage_photos(&id, photos);
        let request = TireReplacementRequest::new(id, details, references(&uploads));

        (&self.requests, &self.photos).transaction(|(requests, blobs)| {
            for (reference, bytes) in &uploads {
                insert_blob(blobs, reference, bytes)?;
            }
            write(requests, &request)
        })?;

        Ok(request)
    }

    fn update(
        &self,
        id: &RequestId,
        details: RequestDetails,
        photos: Option<&[PhotoUpload]>,
    ) -> Result<TireReplacementRequest, RepositoryError> {
        let uploads = photos.map(|photos| stage_photos(id, photos));

        let request = (&self.requests, &self.photos).transaction(|(requests, blobs)| {
            let mut request = read(requests, id)?;
            if request.status != ApprovalStatus::Pending {
                return Err(abort(RepositoryError::NotEditable {
                    id: id.clone(),
                    status: request.status,
                }));
            }
            request.details = details.clone();

            if let Some(uploads) = &uploads {
                let replacement = references(uploads);
                for old in request.photos.iter().filter(|old| !replacement.contains(*old)) {
                    remove_blob(blobs, old)?;
                }
                for (reference, bytes) in uploads {
                    insert_blob(blobs, reference, bytes)?;
                }
                request.photos = replacement;
            }

            write(requests, &request)?;
            Ok(request)
        })?;

        Ok(request)
    }

    /// Removes the request together with every photo blob it owns.
    fn delete(&self, id: &RequestId) -> Result<(), RepositoryError> {
        (&self.requests, &self.photos).transaction(|(requests, blobs)| {
            let request = read(requests, id)?;
            for reference in &request.photos {
                remove_blob(blobs, reference)?;
            }
            requests.remove(id.as_str().as_bytes())?;
            Ok(())
        })?;

        debug!(request_id = %id, "request and photos removed");
        Ok(())
    }

    fn get(&self, id: &RequestId) -> Result<TireReplacementRequest, RepositoryError> {
        self.load(id).map(|(_, request)| request)
    }

    fn list(&self) -> Result<Vec<TireReplacementRequest>, RepositoryError> {
        let mut requests = self
            .requests
            .iter()
            .values()
            .map(|raw| -> Result<TireReplacementRequest, RepositoryError> {
                let raw = raw?;
                Ok(minicbor::decode::<TireReplacementRequest>(&raw)?)
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;
        requests.sort_by_key(|request| request.created_at.to_datetime_utc());
        Ok(requests)
    }

    fn apply_change(
        &self,
        id: &RequestId,
        change: StatusChange,
    ) -> Result<TireReplacementRequest, RepositoryError> {
        self.swap(id, |mut request| {
            change.replay(request.status)?;
            request.record(change.clone());
            Ok(request)
        })
    }

    fn photo(&self, reference: &PhotoReference) -> Result<Option<Vec<u8>>, RepositoryError> {
        let Some(key) = blob_key(reference) else {
            return Ok(None);
        };
        Ok(self.photos.get(key.as_bytes())?.map(|bytes| bytes.to_vec()))
    }
}

type TransactionResult<T> = Result<T, ConflictableTransactionError<RepositoryError>>;

fn abort(err: impl Into<RepositoryError>) -> ConflictableTransactionError<RepositoryError> {
    ConflictableTransactionError::Abort(err.into())
}

/// Photo blobs live under `<request id>/<sha256>`, so a request owns its
/// blobs even when another request uploaded the same bytes.
fn stage_photos(id: &RequestId, photos: &[PhotoUpload]) -> Vec<(PhotoReference, Vec<u8>)> {
    photos
        .iter()
        .map(|upload| {
            let digest = sha256::digest(&upload.bytes);
            let reference =
                PhotoReference::new(format!("uploads/{id}/{digest}.{}", upload.extension()));
            (reference, upload.bytes.clone())
        })
        .collect()
}

fn references(uploads: &[(PhotoReference, Vec<u8>)]) -> Vec<PhotoReference> {
    uploads.iter().map(|(reference, _)| reference.clone()).collect()
}

/// `uploads/<id>/<digest>.<ext>` maps to the blob key `<id>/<digest>`.
fn blob_key(reference: &PhotoReference) -> Option<&str> {
    let name = reference.as_str().strip_prefix("uploads/")?;
    Some(name.rsplit_once('.').map(|(key, _)| key).unwrap_or(name))
}

fn read(requests: &TransactionalTree, id: &RequestId) -> TransactionResult<TireReplacementRequest> {
    let raw = requests
        .get(id.as_str().as_bytes())?
        .ok_or_else(|| abort(RepositoryError::NotFound(id.clone())))?;
    minicbor::decode(&raw).map_err(abort)
}

fn write(requests: &TransactionalTree, request: &TireReplacementRequest) -> TransactionResult<()> {
    let encoded = minicbor::to_vec(request).map_err(abort)?;
    requests.insert(request.id.as_str().as_bytes(), encoded)?;
    Ok(())
}

fn insert_blob(
    blobs: &TransactionalTree,
    reference: &PhotoReference,
    bytes: &[u8],
) -> TransactionResult<()> {
    if let Some(key) = blob_key(reference) {
        blobs.insert(key.as_bytes(), bytes)?;
    }
    Ok(())
}

fn remove_blob(blobs: &TransactionalTree, reference: &PhotoReference) -> TransactionResult<()> {
    if let Some(key) = blob_key(reference) {
        blobs.remove(key.as_bytes())?;
    }
    Ok(())
}
