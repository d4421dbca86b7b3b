use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use landwatch_geo::{GeoTransform, ProbabilityRaster};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StorageError;
use crate::records::{detections_to_geojson, Detection, JobId};
use crate::storage_traits::{StorageResult, StorageSink};

const RASTER_MAGIC: &[u8; 8] = b"LWPRAST1";

#[derive(Debug, Serialize, Deserialize)]
struct RasterHeader {
    job_id: String,
    width: usize,
    height: usize,
    transform: GeoTransform,
    nodata: String,
}

/// Filesystem-backed artifact sink with git-style 2-char sharding.
///
/// Layout: `<root>/objects/<first 2 hex chars>/<remaining hex chars>`,
/// keyed by the SHA-256 of the encoded artifact. Rasters are written as
/// `LWPRAST1`, a little-endian `u32` header length, a JSON header, then
/// row-major little-endian `f32` samples. Vectors are GeoJSON.
#[derive(Debug, Clone)]
pub struct FsStorageSink {
    objects_dir: PathBuf,
}

impl FsStorageSink {
    /// Create a sink rooted at `root`. Creates `root/objects/` if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let objects_dir = root.as_ref().join("objects");
        fs::create_dir_all(&objects_dir)?;
        Ok(Self { objects_dir })
    }

    fn object_path(&self, hex: &str) -> PathBuf {
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    /// Write `data` under its digest and return a `file://` URL.
    fn put(&self, data: Vec<u8>) -> StorageResult<String> {
        let hex = hex::encode(Sha256::digest(&data));
        let path = self.object_path(&hex);

        if !path.exists() {
            let shard_dir = path
                .parent()
                .ok_or_else(|| StorageError::Backend(format!("no parent for {}", path.display())))?;
            fs::create_dir_all(shard_dir)?;

            let mut tmp = NamedTempFile::new_in(shard_dir)?;
            tmp.write_all(&data)?;
            tmp.persist(&path).map_err(|e| e.error)?;
        }

        debug!(path = %path.display(), bytes = data.len(), "artifact stored");
        Ok(format!("file://{}", path.display()))
    }

    async fn put_blocking(&self, data: Vec<u8>) -> StorageResult<String> {
        let sink = self.clone();
        tokio::task::spawn_blocking(move || sink.put(data))
            .await
            .map_err(|e| StorageError::Backend(format!("artifact write task failed: {e}")))?
    }
}

/// Encode a probability raster in the sink's binary layout.
pub fn encode_raster(job_id: &JobId, raster: &ProbabilityRaster) -> StorageResult<Vec<u8>> {
    let header = serde_json::to_vec(&RasterHeader {
        job_id: job_id.to_string(),
        width: raster.width,
        height: raster.height,
        transform: raster.transform,
        nodata: "NaN".into(),
    })?;
    let header_len = u32::try_from(header.len())
        .map_err(|_| StorageError::Serialization("raster header too large".into()))?;

    let mut out = Vec::with_capacity(RASTER_MAGIC.len() + 4 + header.len() + raster.data.len() * 4);
    out.extend_from_slice(RASTER_MAGIC);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(&raster.to_le_bytes());
    Ok(out)
}

/// Decode bytes produced by `encode_raster`.
pub fn decode_raster(bytes: &[u8]) -> StorageResult<ProbabilityRaster> {
    let bad = |msg: &str| StorageError::Serialization(format!("invalid raster artifact: {msg}"));

    let rest = bytes.strip_prefix(RASTER_MAGIC.as_slice()).ok_or_else(|| bad("magic"))?;
    if rest.len() < 4 {
        return Err(bad("truncated header"));
    }
    let (len_bytes, rest) = rest.split_at(4);
    let header_len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
    if rest.len() < header_len as usize {
        return Err(bad("truncated header"));
    }
    let (header, samples) = rest.split_at(header_len as usize);
    let header: RasterHeader = serde_json::from_slice(header)?;

    if samples.len() != header.width * header.height * 4 {
        return Err(bad("sample count"));
    }
    let data = samples
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    ProbabilityRaster::new(header.width, header.height, data, header.transform)
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

#[async_trait]
impl StorageSink for FsStorageSink {
    async fn save_raster(
        &self,
        job_id: &JobId,
        raster: &ProbabilityRaster,
    ) -> StorageResult<String> {
        let bytes = encode_raster(job_id, raster)?;
        self.put_blocking(bytes).await
    }

    async fn save_vectors(
        &self,
        job_id: &JobId,
        detections: &[Detection],
    ) -> StorageResult<String> {
        let collection = detections_to_geojson(detections);
        let bytes = serde_json::to_vec_pretty(&collection)?;
        debug!(job_id = %job_id, features = collection.len(), "encoding vector layer");
        self.put_blocking(bytes).await
    }
}
