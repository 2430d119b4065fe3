use std::fmt;
use std::str::FromStr;

use docgate_model::Operation;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Group of concrete operations sharing one constraint-application rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationFamily {
    Query,
    Count,
    Update,
    Delete,
    Save,
}

impl OperationFamily {
    pub const ALL: [OperationFamily; 5] = [
        OperationFamily::Query,
        OperationFamily::Count,
        OperationFamily::Update,
        OperationFamily::Delete,
        OperationFamily::Save,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            OperationFamily::Query => "query",
            OperationFamily::Count => "count",
            OperationFamily::Update => "update",
            OperationFamily::Delete => "delete",
            OperationFamily::Save => "save",
        }
    }

    /// Concrete operations covered by this family. Fixed; not configurable.
    pub const fn operations(self) -> &'static [Operation] {
        match self {
            OperationFamily::Query => &[Operation::Find, Operation::FindOne, Operation::Distinct],
            OperationFamily::Count => &[
                Operation::CountDocuments,
                Operation::EstimatedDocumentCount,
            ],
            OperationFamily::Update => &[
                Operation::UpdateOne,
                Operation::UpdateMany,
                Operation::FindOneAndUpdate,
                Operation::ReplaceOne,
                Operation::FindOneAndReplace,
            ],
            OperationFamily::Delete => &[
                Operation::DeleteOne,
                Operation::DeleteMany,
                Operation::FindOneAndDelete,
            ],
            OperationFamily::Save => &[Operation::Save, Operation::InsertMany],
        }
    }

    /// Family owning `operation`; `None` for operations that are never
    /// intercepted.
    pub fn of(operation: Operation) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|family| family.operations().contains(&operation))
    }
}

impl fmt::Display for OperationFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown operation family: {0}")]
pub struct UnknownFamily(pub String);

impl FromStr for OperationFamily {
    type Err = UnknownFamily;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|family| family.as_str() == raw.trim())
            .ok_or_else(|| UnknownFamily(raw.to_string()))
    }
}

/// Ordered, duplicate-free set of families a rule applies to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Families(Vec<OperationFamily>);

impl Families {
    /// Build from textual names. Unknown names are dropped, so a rule tagged
    /// only with unknown names is never wired into any hook.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut families = Families::default();
        for name in names {
            match name.as_ref().parse::<OperationFamily>() {
                Ok(family) => families.push(family),
                Err(err) => warn!(%err, "ignoring access rule family"),
            }
        }
        families
    }

    fn push(&mut self, family: OperationFamily) {
        if !self.0.contains(&family) {
            self.0.push(family);
        }
    }

    pub fn contains(&self, family: OperationFamily) -> bool {
        self.0.contains(&family)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = OperationFamily> + '_ {
        self.0.iter().copied()
    }
}

impl From<OperationFamily> for Families {
    fn from(family: OperationFamily) -> Self {
        Families(vec![family])
    }
}

impl<const N: usize> From<[OperationFamily; N]> for Families {
    fn from(list: [OperationFamily; N]) -> Self {
        list.into_iter().collect()
    }
}

impl From<Vec<OperationFamily>> for Families {
    fn from(list: Vec<OperationFamily>) -> Self {
        list.into_iter().collect()
    }
}

impl FromIterator<OperationFamily> for Families {
    fn from_iter<T: IntoIterator<Item = OperationFamily>>(iter: T) -> Self {
        let mut families = Families::default();
        for family in iter {
            families.push(family);
        }
        families
    }
}
