use std::sync::Arc;

use crate::audio::{
    catalog::Catalog,
    clip::{Clip, Collection},
};

/// A chat message that resolved to a sound command.
#[derive(Debug, Clone)]
pub struct SoundCommand {
    pub collection: Arc<Collection>,
    /// Clip named after the command, if any.
    pub clip: Option<Arc<Clip>>,
}

/// Parses `!command [clip]`.
///
/// The message is matched case-insensitively. When a second word is present
/// it must name a clip of the collection, otherwise the message is ignored.
pub fn parse(catalog: &Catalog, content: &str) -> Option<SoundCommand> {
    let content = content.to_lowercase();
    let mut parts = content.split_whitespace();

    let collection = catalog.find_command(parts.next()?)?;
    let clip = match parts.next() {
        Some(name) => Some(collection.clip(name)?.clone()),
        None => None,
    };

    Some(SoundCommand {
        collection: collection.clone(),
        clip,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{catalog::COLLECTIONS, clip::tests::MemoryStore};
    use pretty_assertions::assert_eq;

    async fn catalog() -> Catalog {
        Catalog::load(COLLECTIONS, &MemoryStore::default())
            .await
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn test_random_command() {
        let catalog = catalog().await;
        let command = parse(&catalog, "!airhorn").unwrap();

        assert_eq!(command.collection.prefix(), "airhorn");
        assert!(command.clip.is_none());
    }

    #[tokio::test]
    async fn test_named_clip_is_case_insensitive() {
        let catalog = catalog().await;
        let command = parse(&catalog, "!AirHorn   Truck").unwrap();

        assert_eq!(command.collection.prefix(), "airhorn");
        assert_eq!(command.clip.unwrap().name(), "truck");
    }

    #[tokio::test]
    async fn test_alias_resolves_same_collection() {
        let catalog = catalog().await;
        assert_eq!(parse(&catalog, "!cena").unwrap().collection.prefix(), "jc");
        assert_eq!(parse(&catalog, "!johncena").unwrap().collection.prefix(), "jc");
    }

    #[tokio::test]
    async fn test_ignored_messages() {
        let catalog = catalog().await;
        assert!(parse(&catalog, "").is_none());
        assert!(parse(&catalog, "hello there").is_none());
        assert!(parse(&catalog, "!unknown").is_none());
        // Un clip inexistente no reproduce nada
        assert!(parse(&catalog, "!airhorn nothere").is_none());
    }
}
