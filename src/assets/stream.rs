// src/assets/stream.rs
// Resolves asset requests into encoded Response frames

use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{AssetCache, AssetCatalog, AssetError};
use crate::config::MAX_STREAM_CHUNK_SIZE;
use crate::proto::{self, response};

/// Split `payload` into texture frames of at most `max_frame` bytes.
///
/// Payloads that fit in one frame come back as a single frame with `part` and
/// `parts` left at zero. Larger payloads yield `ceil(len / max_frame)` frames
/// numbered from zero; each frame's data is a slice of `payload`, not a copy.
pub fn split_frames(payload: &Bytes, max_frame: usize) -> Vec<proto::Texture> {
    let max_frame = max_frame.max(1);
    if payload.len() <= max_frame {
        return vec![proto::Texture { data: payload.clone(), part: 0, parts: 0 }];
    }

    let parts = payload.len().div_ceil(max_frame) as u64;
    (0..payload.len())
        .step_by(max_frame)
        .enumerate()
        .map(|(part, start)| {
            let end = (start + max_frame).min(payload.len());
            proto::Texture {
                data: payload.slice(start..end),
                part: part as u64,
                parts,
            }
        })
        .collect()
}

/// Answers texture, material and mesh requests
pub struct AssetStreamer {
    cache: AssetCache,
    catalog: Arc<AssetCatalog>,
    texture_dir: PathBuf,
    max_frame: usize,
}

impl AssetStreamer {
    pub fn new(cache: AssetCache, catalog: Arc<AssetCatalog>, texture_dir: PathBuf) -> Self {
        Self {
            cache,
            catalog,
            texture_dir,
            max_frame: MAX_STREAM_CHUNK_SIZE,
        }
    }

    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }

    pub fn texture_path(&self, id: u64) -> Result<PathBuf, AssetError> {
        let name = self
            .catalog
            .texture_name(id)
            .ok_or(AssetError::UnknownTexture(id))?;
        Ok(self.texture_dir.join(format!("{name}.png")))
    }

    /// Encoded TEXTURE responses for `id`, chunked when the file is large.
    /// Unknown ids and unreadable files yield no frames.
    pub async fn stream_texture(&self, id: u64) -> Vec<Bytes> {
        let data = match self.load_texture(id).await {
            Ok(data) => data,
            Err(e) => {
                warn!(texture_id = id, error = %e, "Texture request yields no result");
                return Vec::new();
            }
        };

        let frames = split_frames(&data, self.max_frame);
        debug!(texture_id = id, bytes = data.len(), frames = frames.len(), "Streaming texture");
        frames
            .into_iter()
            .map(|texture| {
                proto::encode(&proto::Response {
                    r#type: response::Type::Texture as i32,
                    id,
                    texture: Some(texture),
                    ..Default::default()
                })
            })
            .collect()
    }

    async fn load_texture(&self, id: u64) -> Result<Bytes, AssetError> {
        let path = self.texture_path(id)?;
        self.cache.get_or_load(&path).await
    }

    /// Encoded MATERIAL response; never chunked
    pub fn stream_material(&self, id: u64) -> Option<Bytes> {
        let Some(material) = self.catalog.material(id) else {
            warn!(material_id = id, "Unknown material requested");
            return None;
        };
        Some(proto::encode(&proto::Response {
            r#type: response::Type::Material as i32,
            id,
            material: Some(material.clone()),
            ..Default::default()
        }))
    }

    /// Encoded MESH response; never chunked
    pub fn stream_mesh(&self, id: u64) -> Option<Bytes> {
        let Some(geometry) = self.catalog.mesh(id) else {
            warn!(mesh_id = id, "Unknown mesh requested");
            return None;
        };
        Some(proto::encode(&proto::Response {
            r#type: response::Type::Mesh as i32,
            id,
            mesh: Some(proto::Mesh {
                id,
                vertices: geometry.vertices.clone(),
                faces: geometry.faces.clone(),
            }),
            ..Default::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::catalog::{MATERIAL_STONE, MESH_UNIT_BOX, TEXTURE_STONE};
    use prost::Message;
    use std::time::Duration;

    fn payload(len: usize) -> Bytes {
        Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
    }

    fn reassemble(mut frames: Vec<proto::Texture>) -> Vec<u8> {
        frames.sort_by_key(|f| f.part);
        frames.iter().flat_map(|f| f.data.iter().copied()).collect()
    }

    #[test]
    fn small_payload_is_one_frame_without_part_metadata() {
        for len in [0, 1, 100, 16_384] {
            let frames = split_frames(&payload(len), 16_384);
            assert_eq!(frames.len(), 1, "len {len}");
            assert_eq!((frames[0].part, frames[0].parts), (0, 0));
            assert_eq!(frames[0].data.len(), len);
        }
    }

    #[test]
    fn large_payload_reassembles_exactly() {
        for len in [16_385, 32_768, 40_000, 100_001] {
            let p = payload(len);
            let mut frames = split_frames(&p, 16_384);
            let expected_parts = len.div_ceil(16_384);
            assert_eq!(frames.len(), expected_parts);
            assert!(frames.iter().all(|f| f.parts == expected_parts as u64));
            assert!(frames.iter().enumerate().all(|(i, f)| f.part == i as u64));

            // Order on the wire is not guaranteed; the receiver sorts by part
            frames.reverse();
            assert_eq!(reassemble(frames), p.to_vec());
        }
    }

    fn streamer_with_texture(len: usize) -> AssetStreamer {
        let dir = std::env::temp_dir().join(format!("chunkworld-tex-{}", ulid::Ulid::new()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("stone.png"), payload(len)).unwrap();
        AssetStreamer::new(
            AssetCache::new(Duration::from_secs(1800)),
            Arc::new(AssetCatalog::builtin()),
            dir,
        )
    }

    #[tokio::test]
    async fn texture_response_is_chunked_and_cached() {
        let streamer = streamer_with_texture(40_000);
        let frames = streamer.stream_texture(TEXTURE_STONE).await;
        assert_eq!(frames.len(), 3);

        let decoded: Vec<proto::Response> =
            frames.into_iter().map(|f| proto::Response::decode(f).unwrap()).collect();
        assert!(decoded.iter().all(|r| r.r#type == response::Type::Texture as i32 && r.id == TEXTURE_STONE));
        let textures = decoded.into_iter().map(|r| r.texture.unwrap()).collect();
        assert_eq!(reassemble(textures), payload(40_000).to_vec());
        assert_eq!(streamer.cache().total_size(), 40_000);
    }

    #[tokio::test]
    async fn unknown_texture_yields_nothing() {
        let streamer = streamer_with_texture(10);
        assert!(streamer.stream_texture(999).await.is_empty());
        assert_eq!(streamer.cache().len(), 0);
    }

    #[test]
    fn material_and_mesh_are_single_frames() {
        let streamer = streamer_with_texture(10);

        let material = proto::Response::decode(streamer.stream_material(MATERIAL_STONE).unwrap()).unwrap();
        assert_eq!(material.r#type, response::Type::Material as i32);
        assert_eq!(material.material.unwrap().texture_id, TEXTURE_STONE);

        let mesh = proto::Response::decode(streamer.stream_mesh(MESH_UNIT_BOX).unwrap()).unwrap();
        assert_eq!(mesh.r#type, response::Type::Mesh as i32);
        assert_eq!(mesh.mesh.unwrap().vertices.len(), 24);

        assert!(streamer.stream_material(0).is_none());
        assert!(streamer.stream_mesh(0).is_none());
    }
}
