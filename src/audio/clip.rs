use async_trait::async_trait;
use bytes::{Buf, Bytes};
use rand::Rng;
use std::{path::PathBuf, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors produced while reading an encoded clip resource.
#[derive(Debug, Error)]
pub enum ClipError {
    #[error("clip resource {key} not found")]
    NotFound { key: String },

    #[error("truncated frame length prefix at byte {offset}")]
    TruncatedLength { offset: usize },

    #[error("truncated frame payload at byte {offset}: expected {expected} bytes, {available} available")]
    TruncatedFrame {
        offset: usize,
        expected: usize,
        available: usize,
    },

    #[error("failed to read clip resource {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Storage seam for encoded clip resources.
///
/// Resources are located by a deterministic key derived from the collection
/// prefix and the clip name.
#[async_trait]
pub trait ClipStore: Send + Sync {
    async fn open(&self, prefix: &str, name: &str) -> Result<Bytes, ClipError>;
}

/// Resource key for a clip: `<prefix>_<name>.dca`
pub fn resource_key(prefix: &str, name: &str) -> String {
    format!("{prefix}_{name}.dca")
}

/// Reads clip resources from a directory on disk.
#[derive(Debug, Clone)]
pub struct DirClipStore {
    root: PathBuf,
}

impl DirClipStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ClipStore for DirClipStore {
    async fn open(&self, prefix: &str, name: &str) -> Result<Bytes, ClipError> {
        let key = resource_key(prefix, name);
        let path = self.root.join(&key);

        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ClipError::NotFound { key }),
            Err(source) => Err(ClipError::Io { key, source }),
        }
    }
}

/// Splits a length-prefixed resource into its frames.
///
/// Each frame is a little-endian `u16` length followed by that many bytes of
/// opaque payload. Reaching the end of the resource exactly on a frame boundary
/// ends decoding; anything shorter is an error. Frames are zero-copy slices of
/// `data`.
pub fn decode_frames(mut data: Bytes) -> Result<Vec<Bytes>, ClipError> {
    let total = data.len();
    let mut frames = Vec::new();

    while data.has_remaining() {
        let offset = total - data.remaining();
        if data.remaining() < 2 {
            return Err(ClipError::TruncatedLength { offset });
        }

        let len = data.get_u16_le() as usize;
        if data.remaining() < len {
            return Err(ClipError::TruncatedFrame {
                offset: offset + 2,
                expected: len,
                available: data.remaining(),
            });
        }

        frames.push(data.split_to(len));
    }

    Ok(frames)
}

/// Static description of a clip, as declared in the catalog.
#[derive(Debug, Clone, Copy)]
pub struct ClipDef {
    pub name: &'static str,
    pub weight: u32,
    pub hold_ms: u64,
}

/// Static description of a collection, as declared in the catalog.
#[derive(Debug, Clone, Copy)]
pub struct CollectionDef {
    pub prefix: &'static str,
    pub commands: &'static [&'static str],
    pub clips: &'static [ClipDef],
    pub chain_with: Option<&'static str>,
}

/// One selectable unit of pre-encoded audio.
#[derive(Debug)]
pub struct Clip {
    name: String,
    collection: String,
    weight: u32,
    hold: Duration,
    frames: Vec<Bytes>,
}

impl Clip {
    pub fn new(
        collection: impl Into<String>,
        name: impl Into<String>,
        weight: u32,
        hold: Duration,
        frames: Vec<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            weight,
            hold,
            frames,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// How long to keep the session open when this clip ends a run.
    pub fn hold(&self) -> Duration {
        self.hold
    }

    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }

    /// A clip whose resource failed to load has no frames and plays silence.
    pub fn is_playable(&self) -> bool {
        !self.frames.is_empty()
    }
}

/// A named, immutable group of clips reachable through trigger commands.
#[derive(Debug)]
pub struct Collection {
    prefix: String,
    commands: Vec<String>,
    clips: Vec<Arc<Clip>>,
    chain_with: Option<Arc<Collection>>,
    total_weight: u32,
}

impl Collection {
    pub fn new(
        prefix: impl Into<String>,
        commands: Vec<String>,
        clips: Vec<Arc<Clip>>,
        chain_with: Option<Arc<Collection>>,
    ) -> Self {
        let total_weight = clips.iter().map(|clip| clip.weight()).sum();
        Self {
            prefix: prefix.into(),
            commands,
            clips,
            chain_with,
            total_weight,
        }
    }

    /// Loads every clip of `def` from `store`.
    ///
    /// A clip whose resource cannot be read is still registered, with an empty
    /// frame sequence, and its error is returned alongside the collection so the
    /// caller decides how loud to be about it.
    pub async fn load(
        def: &CollectionDef,
        store: &dyn ClipStore,
        chain_with: Option<Arc<Collection>>,
    ) -> (Self, Vec<ClipError>) {
        let mut clips = Vec::with_capacity(def.clips.len());
        let mut failures = Vec::new();

        for clip in def.clips {
            let frames = match store.open(def.prefix, clip.name).await {
                Ok(data) => decode_frames(data),
                Err(e) => Err(e),
            };

            let frames = match frames {
                Ok(frames) => {
                    debug!("🎺 Clip {}/{} cargado ({} frames)", def.prefix, clip.name, frames.len());
                    frames
                }
                Err(e) => {
                    warn!("⚠️ No se pudo cargar el clip {}/{}: {}", def.prefix, clip.name, e);
                    failures.push(e);
                    Vec::new()
                }
            };

            clips.push(Arc::new(Clip::new(
                def.prefix,
                clip.name,
                clip.weight,
                Duration::from_millis(clip.hold_ms),
                frames,
            )));
        }

        let commands = def.commands.iter().map(|c| c.to_string()).collect();
        (Self::new(def.prefix, commands, clips, chain_with), failures)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn clips(&self) -> &[Arc<Clip>] {
        &self.clips
    }

    pub fn chain_with(&self) -> Option<&Arc<Collection>> {
        self.chain_with.as_ref()
    }

    pub fn total_weight(&self) -> u32 {
        self.total_weight
    }

    /// Finds a clip by its exact name.
    pub fn clip(&self, name: &str) -> Option<&Arc<Clip>> {
        self.clips.iter().find(|clip| clip.name == name)
    }

    /// Weighted-random selection using the thread-local RNG.
    pub fn random(&self) -> Option<Arc<Clip>> {
        self.random_with(&mut rand::thread_rng())
    }

    /// Weighted-random selection with a caller-supplied RNG.
    pub fn random_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Arc<Clip>> {
        if self.total_weight == 0 {
            return None;
        }
        self.pick(rng.gen_range(0..self.total_weight)).cloned()
    }

    /// Returns the first clip whose cumulative weight strictly exceeds `draw`.
    pub fn pick(&self, draw: u32) -> Option<&Arc<Clip>> {
        let mut cumulative = 0u32;
        self.clips.iter().find(|clip| {
            cumulative += clip.weight;
            draw < cumulative
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::HashMap;

    /// In-memory store keyed by resource key.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub resources: HashMap<String, Bytes>,
    }

    impl MemoryStore {
        pub fn with(mut self, prefix: &str, name: &str, data: &'static [u8]) -> Self {
            self.resources
                .insert(resource_key(prefix, name), Bytes::from_static(data));
            self
        }
    }

    #[async_trait]
    impl ClipStore for MemoryStore {
        async fn open(&self, prefix: &str, name: &str) -> Result<Bytes, ClipError> {
            let key = resource_key(prefix, name);
            self.resources
                .get(&key)
                .cloned()
                .ok_or(ClipError::NotFound { key })
        }
    }

    pub(crate) fn clip(collection: &str, name: &str, weight: u32) -> Arc<Clip> {
        Arc::new(Clip::new(
            collection,
            name,
            weight,
            Duration::from_millis(250),
            vec![Bytes::from(name.as_bytes().to_vec())],
        ))
    }

    pub(crate) fn collection(prefix: &str, clips: &[(&str, u32)]) -> Collection {
        let clips = clips
            .iter()
            .map(|(name, weight)| clip(prefix, name, *weight))
            .collect();
        Collection::new(prefix, vec![format!("!{prefix}")], clips, None)
    }

    #[test]
    fn test_decode_frames_with_empty_frame() {
        let data = Bytes::from_static(&[0x02, 0x00, 0xAA, 0xBB, 0x00, 0x00]);
        let frames = decode_frames(data).unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], &[0xAA, 0xBB]);
        assert!(frames[1].is_empty());
    }

    #[test]
    fn test_decode_frames_empty_resource() {
        assert!(decode_frames(Bytes::new()).unwrap().is_empty());
    }

    #[test]
    fn test_decode_frames_truncated() {
        let err = decode_frames(Bytes::from_static(&[0x01, 0x00, 0x7F, 0x05])).unwrap_err();
        assert!(matches!(err, ClipError::TruncatedLength { offset: 3 }));

        let err = decode_frames(Bytes::from_static(&[0x03, 0x00, 0x01])).unwrap_err();
        assert!(matches!(
            err,
            ClipError::TruncatedFrame {
                offset: 2,
                expected: 3,
                available: 1
            }
        ));
    }

    #[test]
    fn test_pick_boundaries() {
        let coll = collection("airhorn", &[("a", 1000), ("b", 10)]);
        assert_eq!(coll.total_weight(), 1010);

        for _ in 0..100_000 {
            assert_eq!(coll.pick(0).unwrap().name(), "a");
            assert_eq!(coll.pick(coll.total_weight() - 1).unwrap().name(), "b");
        }
        assert_eq!(coll.pick(999).unwrap().name(), "a");
        assert_eq!(coll.pick(1000).unwrap().name(), "b");
        assert!(coll.pick(1010).is_none());
    }

    #[test]
    fn test_random_without_weight_selects_nothing() {
        let empty = collection("empty", &[]);
        assert!(empty.random().is_none());

        let zero = collection("zero", &[("x", 0), ("y", 0)]);
        assert!(zero.random().is_none());
    }

    #[test]
    fn test_weighted_selection_converges() {
        let coll = collection("cow", &[("herd", 10), ("moo", 10), ("x3", 1)]);
        let mut rng = StdRng::seed_from_u64(0xA1_4B0B);
        let draws = 210_000;

        let mut counts: HashMap<String, u32> = HashMap::new();
        for _ in 0..draws {
            let picked = coll.random_with(&mut rng).unwrap();
            *counts.entry(picked.name().to_string()).or_default() += 1;
        }

        for clip in coll.clips() {
            let expected = clip.weight() as f64 / coll.total_weight() as f64;
            let observed = counts[clip.name()] as f64 / draws as f64;
            assert!(
                (expected - observed).abs() < 0.01,
                "{}: expected {expected:.3}, observed {observed:.3}",
                clip.name()
            );
        }
    }

    #[tokio::test]
    async fn test_load_keeps_failed_clips_silent() {
        const DEF: CollectionDef = CollectionDef {
            prefix: "cow",
            commands: &["!stan", "!stanislav"],
            clips: &[
                ClipDef { name: "herd", weight: 10, hold_ms: 250 },
                ClipDef { name: "moo", weight: 10, hold_ms: 0 },
                ClipDef { name: "x3", weight: 1, hold_ms: 250 },
            ],
            chain_with: None,
        };

        let store = MemoryStore::default()
            .with("cow", "herd", &[0x01, 0x00, 0x11, 0x01, 0x00, 0x22])
            .with("cow", "x3", &[0x05, 0x00, 0x01]);

        let (coll, failures) = Collection::load(&DEF, &store, None).await;

        assert_eq!(coll.total_weight(), 21);
        assert_eq!(coll.commands(), &["!stan".to_string(), "!stanislav".to_string()]);
        assert_eq!(failures.len(), 2);
        assert!(matches!(&failures[0], ClipError::NotFound { key } if key == "cow_moo.dca"));
        assert!(matches!(failures[1], ClipError::TruncatedFrame { .. }));

        let herd = coll.clip("herd").unwrap();
        assert_eq!(herd.frames().len(), 2);
        assert!(herd.is_playable());
        assert!(!coll.clip("moo").unwrap().is_playable());
        assert_eq!(coll.clip("moo").unwrap().hold(), Duration::ZERO);
        assert!(!coll.clip("x3").unwrap().is_playable());
    }
}
