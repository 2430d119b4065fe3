use std::fmt;

use serde::{Deserialize, Serialize};

/// Concrete operations a model exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Find,
    FindOne,
    Distinct,
    CountDocuments,
    EstimatedDocumentCount,
    UpdateOne,
    UpdateMany,
    FindOneAndUpdate,
    ReplaceOne,
    FindOneAndReplace,
    DeleteOne,
    DeleteMany,
    FindOneAndDelete,
    Save,
    InsertMany,
    /// Never intercepted; match stages run against raw collection data.
    Aggregate,
}

impl Operation {
    pub const fn name(self) -> &'static str {
        match self {
            Operation::Find => "find",
            Operation::FindOne => "findOne",
            Operation::Distinct => "distinct",
            Operation::CountDocuments => "countDocuments",
            Operation::EstimatedDocumentCount => "estimatedDocumentCount",
            Operation::UpdateOne => "updateOne",
            Operation::UpdateMany => "updateMany",
            Operation::FindOneAndUpdate => "findOneAndUpdate",
            Operation::ReplaceOne => "replaceOne",
            Operation::FindOneAndReplace => "findOneAndReplace",
            Operation::DeleteOne => "deleteOne",
            Operation::DeleteMany => "deleteMany",
            Operation::FindOneAndDelete => "findOneAndDelete",
            Operation::Save => "save",
            Operation::InsertMany => "insertMany",
            Operation::Aggregate => "aggregate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether an operation is running against loaded documents or a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookKind {
    Document,
    Query,
}

/// Which invocation kinds a registered hook fires for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HookScope {
    pub document: bool,
    pub query: bool,
}

impl HookScope {
    pub const DOCUMENT: HookScope = HookScope {
        document: true,
        query: false,
    };
    pub const QUERY: HookScope = HookScope {
        document: false,
        query: true,
    };
    pub const BOTH: HookScope = HookScope {
        document: true,
        query: true,
    };

    pub fn covers(self, kind: HookKind) -> bool {
        match kind {
            HookKind::Document => self.document,
            HookKind::Query => self.query,
        }
    }
}
