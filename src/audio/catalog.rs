use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tracing::{info, warn};

use super::clip::{ClipDef, ClipStore, Collection, CollectionDef};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("collection {prefix} chains with unknown collection {target}")]
    UnknownChain { prefix: String, target: String },

    #[error("collection {prefix} is declared twice")]
    DuplicatePrefix { prefix: String },

    #[error("command {command} is claimed by both {first} and {second}")]
    DuplicateCommand {
        command: String,
        first: String,
        second: String,
    },
}

/// Counts gathered while loading the catalog, for the startup log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogReport {
    pub collections: usize,
    pub clips: usize,
    pub unplayable: usize,
}

/// Every collection known to the bot, indexed by trigger command.
///
/// Loaded once at startup and shared read-only afterwards.
#[derive(Debug, Default)]
pub struct Catalog {
    collections: Vec<Arc<Collection>>,
    by_command: HashMap<String, usize>,
}

impl Catalog {
    /// Loads `defs` in order from `store`.
    ///
    /// A chain target must be declared before the collection that chains with
    /// it. Clips that fail to load stay registered but silent; they are only
    /// counted in the returned report.
    pub async fn load(
        defs: &[CollectionDef],
        store: &dyn ClipStore,
    ) -> Result<(Self, CatalogReport), CatalogError> {
        let mut catalog = Self::default();
        let mut by_prefix: HashMap<&str, Arc<Collection>> = HashMap::new();
        let mut report = CatalogReport::default();

        for def in defs {
            if by_prefix.contains_key(def.prefix) {
                return Err(CatalogError::DuplicatePrefix {
                    prefix: def.prefix.to_string(),
                });
            }

            let chain_with = match def.chain_with {
                Some(target) => Some(by_prefix.get(target).cloned().ok_or_else(|| {
                    CatalogError::UnknownChain {
                        prefix: def.prefix.to_string(),
                        target: target.to_string(),
                    }
                })?),
                None => None,
            };

            let (collection, failures) = Collection::load(def, store, chain_with).await;
            if !failures.is_empty() {
                warn!(
                    "⚠️ Colección {} cargada con {} clips sin audio",
                    def.prefix,
                    failures.len()
                );
            }

            report.collections += 1;
            report.clips += collection.clips().len();
            report.unplayable += failures.len();

            let collection = Arc::new(collection);
            catalog.insert(collection.clone())?;
            by_prefix.insert(def.prefix, collection);
        }

        info!(
            "📚 Catálogo cargado: {} colecciones, {} clips ({} sin audio)",
            report.collections, report.clips, report.unplayable
        );
        Ok((catalog, report))
    }

    fn insert(&mut self, collection: Arc<Collection>) -> Result<(), CatalogError> {
        let index = self.collections.len();
        for command in collection.commands() {
            if let Some(&other) = self.by_command.get(command) {
                return Err(CatalogError::DuplicateCommand {
                    command: command.clone(),
                    first: self.collections[other].prefix().to_string(),
                    second: collection.prefix().to_string(),
                });
            }
            self.by_command.insert(command.clone(), index);
        }
        self.collections.push(collection);
        Ok(())
    }

    /// Collection triggered by `command` (e.g. `!airhorn`).
    pub fn find_command(&self, command: &str) -> Option<&Arc<Collection>> {
        self.by_command
            .get(command)
            .map(|&index| &self.collections[index])
    }

    pub fn collections(&self) -> &[Arc<Collection>] {
        &self.collections
    }
}

const fn clip(name: &'static str, weight: u32, hold_ms: u64) -> ClipDef {
    ClipDef {
        name,
        weight,
        hold_ms,
    }
}

/// Built-in collections. `another` chains with `airhorn`, so `airhorn` comes first.
pub const COLLECTIONS: &[CollectionDef] = &[
    CollectionDef {
        prefix: "airhorn",
        commands: &["!airhorn"],
        clips: &[
            clip("default", 1000, 250),
            clip("reverb", 800, 250),
            clip("spam", 800, 0),
            clip("tripletap", 800, 250),
            clip("fourtap", 800, 250),
            clip("distant", 500, 250),
            clip("echo", 500, 250),
            clip("clownfull", 250, 250),
            clip("clownshort", 250, 250),
            clip("clownspam", 250, 0),
            clip("highfartlong", 200, 250),
            clip("highfartshort", 200, 250),
            clip("midshort", 100, 250),
            clip("truck", 10, 250),
        ],
        chain_with: None,
    },
    CollectionDef {
        prefix: "another",
        commands: &["!anotha", "!anothaone"],
        clips: &[
            clip("one", 1, 250),
            clip("one_classic", 1, 250),
            clip("one_echo", 1, 250),
        ],
        chain_with: Some("airhorn"),
    },
    CollectionDef {
        prefix: "jc",
        commands: &["!johncena", "!cena"],
        clips: &[
            clip("airhorn", 1, 250),
            clip("echo", 1, 250),
            clip("full", 1, 250),
            clip("jc", 1, 250),
            clip("nameis", 1, 250),
            clip("spam", 1, 250),
        ],
        chain_with: None,
    },
    CollectionDef {
        prefix: "cow",
        commands: &["!stan", "!stanislav"],
        clips: &[clip("herd", 10, 250), clip("moo", 10, 250), clip("x3", 1, 250)],
        chain_with: None,
    },
    CollectionDef {
        prefix: "birthday",
        commands: &["!birthday", "!bday"],
        clips: &[
            clip("horn", 50, 250),
            clip("horn3", 30, 250),
            clip("sadhorn", 25, 250),
            clip("weakhorn", 25, 250),
        ],
        chain_with: None,
    },
    CollectionDef {
        prefix: "owult",
        commands: &["!overwatch", "!owult"],
        clips: &[
            clip("bastion", 1000, 250),
            clip("dva_enemy", 1000, 250),
            clip("dva_friendly", 1000, 250),
            clip("genji_enemy", 1000, 250),
            clip("genji_friendly", 1000, 250),
            clip("hanzo_enemy", 1000, 250),
            clip("hanzo_friendly", 1000, 250),
            clip("junkrat_enemy", 1000, 250),
            clip("junkrat_friendly", 1000, 250),
            clip("lucio_friendly", 1000, 250),
            clip("lucio_enemy", 1000, 250),
            clip("mccree_enemy", 1000, 250),
            clip("mccree_friendly", 1000, 250),
            clip("mei_friendly", 1000, 250),
            clip("mei_enemy", 1000, 250),
            clip("mercy_friendly", 1000, 250),
            clip("mercy_friendly_devil", 1000, 250),
            clip("mercy_friendly_valkyrie", 1000, 250),
            clip("mercy_enemy", 1000, 250),
            clip("orisa_enemy", 1000, 250),
            clip("orisa_friendly", 1000, 250),
            clip("pharah_enemy", 1000, 250),
            clip("pharah_friendly", 1000, 250),
            clip("reaper_enemy", 1000, 250),
            clip("reaper_friendly", 1000, 250),
            clip("reinhardt", 1000, 250),
            clip("roadhog_enemy", 1000, 250),
            clip("roadhog_friendly", 1000, 250),
            clip("76_enemy", 1000, 250),
            clip("76_friendly", 1000, 250),
            clip("sombra_enemy", 1000, 250),
            clip("sombra_friendly", 1000, 250),
            clip("symmetra_teleporter", 1000, 250),
            clip("symmetra_shield", 1000, 250),
            clip("torbjorn", 1000, 250),
            clip("tracer_enemy", 1000, 250),
            clip("tracer_friendly", 1000, 250),
            clip("widow_enemy", 1000, 250),
            clip("widow_friendly", 1000, 250),
            clip("zarya_enemy", 1000, 250),
            clip("zarya_friendly", 1000, 250),
            clip("zenyatta_enemy", 1000, 250),
            clip("zenyatta_friendly", 1000, 250),
            clip("dva_;)", 1000, 250),
            clip("anyong", 1000, 250),
        ],
        chain_with: None,
    },
    CollectionDef {
        prefix: "roode",
        commands: &["!roode"],
        clips: &[
            clip("glorious", 100, 250),
            clip("defend", 5, 250),
            clip("victorious_full", 1, 250),
        ],
        chain_with: None,
    },
    CollectionDef {
        prefix: "revival",
        commands: &["!revival"],
        clips: &[clip("we_go_hard", 100, 250), clip("say_yeah", 25, 250)],
        chain_with: None,
    },
    CollectionDef {
        prefix: "styles",
        commands: &["!styles", "!aj"],
        clips: &[clip("gay_community", 100, 250)],
        chain_with: None,
    },
    CollectionDef {
        prefix: "dummy",
        commands: &["!dummy"],
        clips: &[clip("yeah", 100, 250)],
        chain_with: None,
    },
    CollectionDef {
        prefix: "dota",
        commands: &["!dota", "!tobi", "!tobiwan"],
        clips: &[
            clip("alldead", 100, 250),
            clip("digitalsports", 100, 250),
            clip("dingdingding", 100, 250),
            clip("disaster", 100, 250),
            clip("liquid", 100, 250),
            clip("pudge", 100, 250),
            clip("waow", 100, 250),
        ],
        chain_with: None,
    },
    CollectionDef {
        prefix: "jones",
        commands: &["!jones", "!alexjones"],
        clips: &[
            clip("kissing_goblins", 100, 250),
            clip("kissing_goblins_full", 100, 250),
            clip("in_bed_goblin", 100, 250),
            clip("charging_goblins", 100, 250),
            clip("pepsi_taste_test", 100, 250),
            clip("1776", 100, 250),
            clip("human", 100, 250),
            clip("destroy_everything", 100, 250),
            clip("hot_blood", 100, 250),
            clip("have_children", 100, 250),
            clip("gang_of_mustaches", 100, 250),
            clip("sick_of_it", 100, 250),
            clip("what_is_that_joke", 100, 250),
            clip("what_is_venezuela", 100, 250),
            clip("the_gay_bomb", 100, 250),
            clip("punches", 100, 250),
            clip("its_a_gay_bomb", 100, 250),
            clip("gay_frogs", 100, 250),
            clip("fight_for_your_life", 100, 250),
        ],
        chain_with: None,
    },
    CollectionDef {
        prefix: "mummy",
        commands: &["!mummy"],
        clips: &[
            clip("1", 100, 250),
            clip("2", 100, 250),
            clip("3", 100, 250),
            clip("4", 100, 250),
            clip("5", 100, 250),
            clip("6", 100, 250),
            clip("7", 100, 250),
            clip("8", 100, 250),
        ],
        chain_with: None,
    },
    CollectionDef {
        prefix: "imhere",
        commands: &["!im_here", "!imhere"],
        clips: &[clip("find_me", 100, 250)],
        chain_with: None,
    },
    CollectionDef {
        prefix: "newsreel",
        commands: &["!newsreel"],
        clips: &[clip("ooh_swish", 100, 250)],
        chain_with: None,
    },
    CollectionDef {
        prefix: "logan",
        commands: &["!logan"],
        clips: &[
            clip("1", 100, 250),
            clip("2", 100, 250),
            clip("3", 100, 250),
            clip("4", 100, 250),
        ],
        chain_with: None,
    },
    CollectionDef {
        prefix: "foxy",
        commands: &["!foxy"],
        clips: &[clip("trying", 100, 250)],
        chain_with: None,
    },
    CollectionDef {
        prefix: "enzo",
        commands: &["!enzo"],
        clips: &[clip("sawft_arena", 100, 250)],
        chain_with: None,
    },
    CollectionDef {
        prefix: "money",
        commands: &["!money"],
        clips: &[
            clip("lodsofemone", 100, 250),
            clip("lodsofemone_full", 100, 250),
            clip("wopitout", 100, 250),
        ],
        chain_with: None,
    },
    CollectionDef {
        prefix: "gw2",
        commands: &["!gw2"],
        clips: &[clip("rose", 100, 250)],
        chain_with: None,
    },
    CollectionDef {
        prefix: "theweed",
        commands: &["!theweed", "!weed"],
        clips: &[clip("all", 100, 250)],
        chain_with: None,
    },
    CollectionDef {
        prefix: "tf2",
        commands: &["!tf2"],
        clips: &[
            clip("overtime1", 100, 250),
            clip("overtime2", 100, 250),
            clip("overtime3", 100, 250),
            clip("overtime4", 100, 250),
        ],
        chain_with: None,
    },
    CollectionDef {
        prefix: "assblastusa",
        commands: &["!assblastusa"],
        clips: &[clip("full", 100, 250)],
        chain_with: None,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clip::tests::MemoryStore;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_builtin_catalog_loads_without_audio() {
        let (catalog, report) = Catalog::load(COLLECTIONS, &MemoryStore::default())
            .await
            .unwrap();

        assert_eq!(report.collections, COLLECTIONS.len());
        assert_eq!(report.clips, report.unplayable);
        assert_eq!(catalog.collections().len(), COLLECTIONS.len());

        let airhorn = catalog.find_command("!airhorn").unwrap();
        assert_eq!(airhorn.clips().len(), 14);
        assert_eq!(airhorn.total_weight(), 6460);

        let another = catalog.find_command("!anothaone").unwrap();
        assert_eq!(another.prefix(), "another");
        assert_eq!(another.chain_with().unwrap().prefix(), "airhorn");

        assert_eq!(
            catalog.find_command("!tobiwan").unwrap().prefix(),
            "dota"
        );
        assert!(catalog.find_command("!nope").is_none());
    }

    #[tokio::test]
    async fn test_chain_target_must_be_declared_first() {
        const DEFS: &[CollectionDef] = &[
            CollectionDef {
                prefix: "another",
                commands: &["!anotha"],
                clips: &[clip("one", 1, 250)],
                chain_with: Some("airhorn"),
            },
            CollectionDef {
                prefix: "airhorn",
                commands: &["!airhorn"],
                clips: &[clip("default", 1000, 250)],
                chain_with: None,
            },
        ];

        let err = Catalog::load(DEFS, &MemoryStore::default()).await.unwrap_err();
        assert!(matches!(err, CatalogError::UnknownChain { ref target, .. } if target == "airhorn"));
    }

    #[tokio::test]
    async fn test_duplicate_command_rejected() {
        const DEFS: &[CollectionDef] = &[
            CollectionDef {
                prefix: "tf2",
                commands: &["!tf2"],
                clips: &[clip("overtime1", 100, 250)],
                chain_with: None,
            },
            CollectionDef {
                prefix: "tf2_again",
                commands: &["!tf2"],
                clips: &[clip("overtime2", 100, 250)],
                chain_with: None,
            },
        ];

        let err = Catalog::load(DEFS, &MemoryStore::default()).await.unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateCommand { ref command, .. } if command == "!tf2"));
    }
}
