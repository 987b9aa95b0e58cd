//! Operation families and verb routing
//!
//! A step names a verb in its `action` field. The family that owns the verb
//! comes from the step's explicit `type`, or failing that from the fixed
//! verb table below. Both lookups are static tables; nothing is evaluated.

use serde::{Deserialize, Serialize};
use std::fmt;

use serde_json::Value;

use super::step::{Step, Workflow};

/// Backend categories a step can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationFamily {
    /// HTTP and GraphQL calls
    Api,
    /// Relational database statements
    Database,
    /// Local text files
    File,
    /// Object storage, batch jobs, secrets, functions, queues, queries
    Cloud,
    /// Publish/subscribe events
    Messaging,
}

/// Verb -> family, consulted when a step has no explicit `type`
const VERB_FAMILIES: &[(&str, OperationFamily)] = &[
    ("get", OperationFamily::Api),
    ("post", OperationFamily::Api),
    ("put", OperationFamily::Api),
    ("patch", OperationFamily::Api),
    ("delete", OperationFamily::Api),
    ("graphql", OperationFamily::Api),
    ("select", OperationFamily::Database),
    ("insert", OperationFamily::Database),
    ("update", OperationFamily::Database),
    ("deletedb", OperationFamily::Database),
    ("count", OperationFamily::Database),
    ("read", OperationFamily::File),
    ("write", OperationFamily::File),
    ("s3upload", OperationFamily::Cloud),
    ("s3download", OperationFamily::Cloud),
    ("batch", OperationFamily::Cloud),
    ("secrets", OperationFamily::Cloud),
    ("calllambda", OperationFamily::Cloud),
    ("sendsqs", OperationFamily::Cloud),
    ("receivesqs", OperationFamily::Cloud),
    ("athena", OperationFamily::Cloud),
    ("send_event", OperationFamily::Messaging),
    ("read_event", OperationFamily::Messaging),
];

/// Family names accepted in a step's `type` field (compared case-insensitively)
const FAMILY_NAMES: &[(&str, OperationFamily)] = &[
    ("api", OperationFamily::Api),
    ("http", OperationFamily::Api),
    ("db", OperationFamily::Database),
    ("database", OperationFamily::Database),
    ("file", OperationFamily::File),
    ("data", OperationFamily::File),
    ("cloud", OperationFamily::Cloud),
    ("aws", OperationFamily::Cloud),
    ("messaging", OperationFamily::Messaging),
    ("kafka", OperationFamily::Messaging),
    ("kafkahandler", OperationFamily::Messaging),
];

impl OperationFamily {
    /// Family that owns a (lower-cased) verb
    pub fn for_verb(verb: &str) -> Option<Self> {
        VERB_FAMILIES
            .iter()
            .find(|(name, _)| *name == verb)
            .map(|(_, family)| *family)
    }

    /// Family named by a step's `type` field
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        FAMILY_NAMES
            .iter()
            .find(|(alias, _)| *alias == name)
            .map(|(_, family)| *family)
    }

    /// Verbs this family answers to
    pub fn verbs(&self) -> impl Iterator<Item = &'static str> + '_ {
        VERB_FAMILIES
            .iter()
            .filter(move |(_, family)| family == self)
            .map(|(verb, _)| *verb)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationFamily::Api => "api",
            OperationFamily::Database => "database",
            OperationFamily::File => "file",
            OperationFamily::Cloud => "cloud",
            OperationFamily::Messaging => "messaging",
        }
    }
}

impl fmt::Display for OperationFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors routing a step to a family
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    #[error("Unknown operation family '{0}'")]
    UnknownFamily(String),

    #[error("No operation family handles action '{0}'")]
    UnknownVerb(String),

    #[error("Operation family '{family}' has no action '{verb}'")]
    UnsupportedVerb {
        family: OperationFamily,
        verb: String,
    },
}

/// A step's verb together with the family that will run it
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAction {
    pub family: OperationFamily,
    pub verb: String,
}

impl ParsedAction {
    /// Route a verb, honouring an explicit family name
    pub fn parse(verb: &str, family: Option<&str>) -> Result<Self, ActionError> {
        let verb = verb.trim().to_lowercase();

        let family = match family.map(str::trim).filter(|f| !f.is_empty()) {
            Some(name) => OperationFamily::from_name(name)
                .ok_or_else(|| ActionError::UnknownFamily(name.to_string()))?,
            None => OperationFamily::for_verb(&verb)
                .ok_or_else(|| ActionError::UnknownVerb(verb.clone()))?,
        };

        if !family.verbs().any(|known| known == verb) {
            return Err(ActionError::UnsupportedVerb { family, verb });
        }

        Ok(Self { family, verb })
    }

    pub fn for_step(step: &Step) -> Result<Self, ActionError> {
        Self::parse(&step.action, step.family.as_deref())
    }
}

impl fmt::Display for ParsedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.family, self.verb)
    }
}

/// Steps of a workflow whose verb cannot be routed, by index. A step whose
/// `action` or `type` is still a `<<key>>` placeholder is only known at run
/// time and is not reported.
pub fn unroutable_steps(workflow: &Workflow) -> Vec<(usize, ActionError)> {
    workflow
        .steps
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| {
            let verb = raw.get("action").and_then(Value::as_str).unwrap_or_default();
            let family = raw.get("type").and_then(Value::as_str);
            if verb.contains("<<") || family.is_some_and(|f| f.contains("<<")) {
                return None;
            }
            ParsedAction::parse(verb, family).err().map(|e| (index, e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_api_verbs() {
        for verb in ["get", "POST", "Put", "patch", "delete", "graphql"] {
            let action = ParsedAction::parse(verb, None).unwrap();
            assert_eq!(action.family, OperationFamily::Api);
            assert_eq!(action.verb, verb.to_lowercase());
        }
    }

    #[test]
    fn test_parse_database_verbs() {
        let action = ParsedAction::parse("select", None).unwrap();
        assert_eq!(action.family, OperationFamily::Database);

        let action = ParsedAction::parse("deletedb", None).unwrap();
        assert_eq!(action.family, OperationFamily::Database);
    }

    #[test]
    fn test_parse_cloud_verbs_are_lowercased() {
        let action = ParsedAction::parse("s3Download", None).unwrap();
        assert_eq!(action.family, OperationFamily::Cloud);
        assert_eq!(action.verb, "s3download");

        let action = ParsedAction::parse("sendSQS", None).unwrap();
        assert_eq!(action.verb, "sendsqs");
    }

    #[test]
    fn test_parse_messaging_verbs() {
        let action = ParsedAction::parse("send_event", None).unwrap();
        assert_eq!(action.family, OperationFamily::Messaging);
    }

    #[test]
    fn test_explicit_family_overrides_table() {
        let action = ParsedAction::parse("deletedb", Some("DB")).unwrap();
        assert_eq!(action.family, OperationFamily::Database);

        let action = ParsedAction::parse("secrets", Some("aws")).unwrap();
        assert_eq!(action.family, OperationFamily::Cloud);

        let action = ParsedAction::parse("read_event", Some("KafkaHandler")).unwrap();
        assert_eq!(action.family, OperationFamily::Messaging);

        let action = ParsedAction::parse("read", Some("Data")).unwrap();
        assert_eq!(action.family, OperationFamily::File);
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(
            ParsedAction::parse("explode", None),
            Err(ActionError::UnknownVerb("explode".into()))
        );
        assert_eq!(
            ParsedAction::parse("get", Some("Ftp")),
            Err(ActionError::UnknownFamily("Ftp".into()))
        );
        assert_eq!(
            ParsedAction::parse("delete", Some("db")),
            Err(ActionError::UnsupportedVerb {
                family: OperationFamily::Database,
                verb: "delete".into(),
            })
        );
    }

    #[test]
    fn test_family_verbs() {
        let verbs: Vec<_> = OperationFamily::File.verbs().collect();
        assert_eq!(verbs, vec!["read", "write"]);
    }

    #[test]
    fn test_unroutable_steps() {
        let workflow: Workflow = serde_json::from_value(serde_json::json!({
            "steps": [
                {"action": "get"},
                {"action": "explode"},
                {"action": "<<verb>>"},
                {"action": "select", "type": "file"},
            ]
        }))
        .unwrap();

        let problems = unroutable_steps(&workflow);
        assert_eq!(problems.len(), 2);
        assert_eq!(problems[0], (1, ActionError::UnknownVerb("explode".into())));
        assert_eq!(problems[1].0, 3);
    }
}
