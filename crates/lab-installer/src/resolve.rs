//! Configuration resolution.
//!
//! Each field is taken from the first source that has a non-empty value:
//! environment variable, answers file, operator prompt (seeded with the
//! computed default), then the fallback default. Nothing here touches the
//! terminal directly; prompting goes through [`Prompter`].

use std::collections::HashMap;

use anyhow::Result;
use host_probe::HostFacts;
use host_probe::network::is_valid_mac;
use strum::{Display, EnumIter, IntoEnumIterator};
use tracing::{debug, warn};

use crate::config::{
    AnswerFile, DEFAULT_MASTER_URL, ExperimentBinding, MasterEndpoint, NodeConfig, NodeIdentity,
    ServerBinding,
};
use crate::prompt::Prompter;

pub const REPO_URL_VAR: &str = "VLAB_REPO_URL";

/// Point-in-time copy of the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot(HashMap<String, String>);

impl EnvSnapshot {
    pub fn capture() -> Self {
        Self(std::env::vars().collect())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Value of `key`; a variable set to the empty string counts as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Field {
    #[strum(to_string = "node id")]
    NodeId,
    #[strum(to_string = "node name")]
    NodeName,
    #[strum(to_string = "MAC address")]
    Mac,
    #[strum(to_string = "experiment id")]
    ExperimentId,
    #[strum(to_string = "master URL")]
    MasterUrl,
    #[strum(to_string = "master API key")]
    MasterApiKey,
    #[strum(to_string = "location")]
    Location,
}

impl Field {
    pub fn env_var(self) -> &'static str {
        match self {
            Field::NodeId => "VLAB_PI_ID",
            Field::NodeName => "VLAB_PI_NAME",
            Field::Mac => "VLAB_PI_MAC",
            Field::ExperimentId => "EXPERIMENT_ID",
            Field::MasterUrl => "MASTER_URL",
            Field::MasterApiKey => "MASTER_API_KEY",
            Field::Location => "VLAB_PI_LOCATION",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::NodeId => "Lab Pi ID",
            Field::NodeName => "Lab Pi display name",
            Field::Mac => "MAC address",
            Field::ExperimentId => "Experiment ID",
            Field::MasterUrl => "Master Pi URL",
            Field::MasterApiKey => "Master API key (optional)",
            Field::Location => "Location (optional)",
        }
    }

    pub fn is_secret(self) -> bool {
        matches!(self, Field::MasterApiKey)
    }

    fn answer(self, answers: &AnswerFile) -> Option<&str> {
        let value = match self {
            Field::NodeId => &answers.node_id,
            Field::NodeName => &answers.node_name,
            Field::Mac => &answers.mac,
            Field::ExperimentId => &answers.experiment_id,
            Field::MasterUrl => &answers.master_url,
            Field::MasterApiKey => &answers.master_api_key,
            Field::Location => &answers.location,
        };
        value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Computed default, or the fallback constant when nothing can be computed.
    pub fn default_value(self, facts: &HostFacts) -> String {
        match self {
            Field::NodeId => format!("lab-{}", facts.hostname),
            Field::NodeName => format!("Lab Pi {}", facts.hostname),
            Field::Mac => facts.mac().to_string(),
            Field::MasterUrl => DEFAULT_MASTER_URL.to_string(),
            Field::ExperimentId | Field::MasterApiKey | Field::Location => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Source {
    #[strum(to_string = "environment")]
    Environment,
    #[strum(to_string = "answers file")]
    AnswerFile,
    #[strum(to_string = "operator")]
    Operator,
    #[strum(to_string = "default")]
    Default,
}

pub struct Resolver<'a> {
    env: &'a EnvSnapshot,
    answers: &'a AnswerFile,
    facts: &'a HostFacts,
}

impl<'a> Resolver<'a> {
    pub fn new(env: &'a EnvSnapshot, answers: &'a AnswerFile, facts: &'a HostFacts) -> Self {
        Self { env, answers, facts }
    }

    /// Value fixed before any prompting, if there is one.
    pub fn preset(&self, field: Field) -> Option<(String, Source)> {
        if let Some(value) = self.env.get(field.env_var()) {
            return Some((value.to_string(), Source::Environment));
        }
        field
            .answer(self.answers)
            .map(|value| (value.to_string(), Source::AnswerFile))
    }

    pub fn resolve_field(&self, field: Field, prompter: &dyn Prompter) -> Result<(String, Source)> {
        if let Some(preset) = self.preset(field) {
            return Ok(preset);
        }

        let default = field.default_value(self.facts);
        if prompter.is_interactive() {
            let answer = prompter.ask(field, &default)?;
            Ok((answer.trim().to_string(), Source::Operator))
        } else {
            Ok((default, Source::Default))
        }
    }

    pub fn resolve(&self, prompter: &dyn Prompter) -> Result<NodeConfig> {
        let mut values = HashMap::new();
        for field in Field::iter() {
            let (value, source) = self.resolve_field(field, prompter)?;
            if field.is_secret() {
                debug!("{} taken from {}", field, source);
            } else {
                debug!("{} = {:?} (from {})", field, value, source);
            }
            values.insert(field, value);
        }

        let mut take = |field: Field| values.remove(&field).unwrap_or_default();

        let mac = take(Field::Mac);
        if mac.is_empty() {
            warn!("No MAC address found; recording it as unknown");
        } else if !is_valid_mac(&mac) {
            warn!("MAC address {:?} does not look like aa:bb:cc:dd:ee:ff; keeping it as given", mac);
        }

        Ok(NodeConfig {
            identity: NodeIdentity {
                id: take(Field::NodeId),
                name: take(Field::NodeName),
                mac,
                location: take(Field::Location),
            },
            experiment: ExperimentBinding {
                experiment_id: take(Field::ExperimentId),
            },
            master: MasterEndpoint {
                url: take(Field::MasterUrl),
                api_key: take(Field::MasterApiKey),
            },
            server: ServerBinding::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::PathBuf;

    use host_probe::network::LinkAddress;
    use host_probe::{Architecture, Platform};

    use super::*;
    use crate::prompt::AcceptDefaults;

    fn facts() -> HostFacts {
        HostFacts {
            root: PathBuf::from("/"),
            hostname: "bench07".to_string(),
            architecture: Architecture::Aarch64,
            platform: Platform::Unknown,
            link: Some(LinkAddress {
                interface: "eth0".to_string(),
                mac: "b8:27:eb:00:00:07".to_string(),
            }),
        }
    }

    /// Answers prompts from a fixed table and records what was asked.
    struct TablePrompter {
        answers: HashMap<Field, String>,
        asked: RefCell<Vec<(Field, String)>>,
    }

    impl Prompter for TablePrompter {
        fn is_interactive(&self) -> bool {
            true
        }

        fn ask(&self, field: Field, default: &str) -> Result<String> {
            self.asked.borrow_mut().push((field, default.to_string()));
            Ok(self
                .answers
                .get(&field)
                .cloned()
                .unwrap_or_else(|| default.to_string()))
        }

        fn confirm(&self, _prompt: &str) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn defaults_are_derived_from_hostname() {
        let env = EnvSnapshot::default();
        let answers = AnswerFile::default();
        let facts = facts();
        let config = Resolver::new(&env, &answers, &facts)
            .resolve(&AcceptDefaults)
            .unwrap();

        assert_eq!(config.identity.id, "lab-bench07");
        assert_eq!(config.identity.name, "Lab Pi bench07");
        assert_eq!(config.identity.mac, "b8:27:eb:00:00:07");
        assert_eq!(config.master.url, "http://192.168.1.5:5000");
        assert_eq!(config.experiment.experiment_id, "");
        assert_eq!(config.server, ServerBinding::default());
    }

    #[test]
    fn environment_beats_answers_file_and_prompt() {
        let env = EnvSnapshot::from_pairs([("VLAB_PI_ID", "lab-001"), ("EXPERIMENT_ID", "4")]);
        let answers = AnswerFile {
            node_id: Some("lab-from-file".into()),
            master_url: Some("http://10.0.0.2:5000".into()),
            ..AnswerFile::default()
        };
        let facts = facts();
        let prompter = TablePrompter {
            answers: HashMap::from([(Field::Location, "Bench 3".to_string())]),
            asked: RefCell::new(Vec::new()),
        };

        let config = Resolver::new(&env, &answers, &facts)
            .resolve(&prompter)
            .unwrap();

        assert_eq!(config.identity.id, "lab-001");
        assert_eq!(config.experiment.experiment_id, "4");
        assert_eq!(config.master.url, "http://10.0.0.2:5000");
        assert_eq!(config.identity.location, "Bench 3");

        let asked: Vec<Field> = prompter.asked.borrow().iter().map(|(f, _)| *f).collect();
        assert!(!asked.contains(&Field::NodeId));
        assert!(!asked.contains(&Field::ExperimentId));
        assert!(!asked.contains(&Field::MasterUrl));
        assert!(asked.contains(&Field::NodeName));
    }

    #[test]
    fn prompt_is_seeded_with_computed_default() {
        let env = EnvSnapshot::default();
        let answers = AnswerFile::default();
        let facts = facts();
        let prompter = TablePrompter {
            answers: HashMap::new(),
            asked: RefCell::new(Vec::new()),
        };

        Resolver::new(&env, &answers, &facts)
            .resolve(&prompter)
            .unwrap();

        let asked = prompter.asked.borrow();
        assert!(asked.contains(&(Field::NodeId, "lab-bench07".to_string())));
        assert!(asked.contains(&(Field::MasterUrl, DEFAULT_MASTER_URL.to_string())));
    }

    #[test]
    fn empty_environment_value_counts_as_unset() {
        let env = EnvSnapshot::from_pairs([("MASTER_URL", "  ")]);
        let answers = AnswerFile::default();
        let facts = facts();
        let (value, source) = Resolver::new(&env, &answers, &facts)
            .resolve_field(Field::MasterUrl, &AcceptDefaults)
            .unwrap();

        assert_eq!(value, DEFAULT_MASTER_URL);
        assert_eq!(source, Source::Default);
    }

    #[test]
    fn missing_interface_leaves_mac_empty() {
        let env = EnvSnapshot::default();
        let answers = AnswerFile::default();
        let mut facts = facts();
        facts.link = None;

        let config = Resolver::new(&env, &answers, &facts)
            .resolve(&AcceptDefaults)
            .unwrap();
        assert_eq!(config.identity.mac, "");
    }
}
