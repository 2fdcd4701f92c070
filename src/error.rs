use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PhenolinkError {
    #[error("template syntax error: {0}")]
    TemplateSyntax(String),

    #[error("unknown list transform: {0}")]
    UnknownTransform(String),

    #[error("unresolved document key in index: {0}")]
    UnresolvedKey(String),

    #[error("unresolved {entity} identifier: {id}")]
    UnresolvedIdentifier { entity: String, id: String },

    #[error("identifier collision for ({entity}, {id}): {existing} vs {incoming}")]
    IdentifierCollision {
        entity: String,
        id: String,
        existing: String,
        incoming: String,
    },

    #[error("record has no {entity}DbId identifier")]
    MissingIdentifier { entity: String },

    #[error("invalid source descriptor: {0}")]
    InvalidSource(String),

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("invalid global identifier: {0}")]
    InvalidGlobalIdentifier(String),

    #[error("a batch is already open on this index")]
    BatchAlreadyOpen,

    #[error("index write outside an open batch")]
    WriteOutsideBatch,

    #[error("commit without an open batch")]
    NoOpenBatch,
}
