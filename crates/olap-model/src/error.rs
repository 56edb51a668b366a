pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("duplicate dimension: {0}")]
    DuplicateDimension(String),

    #[error("duplicate hierarchy {hierarchy} in dimension {dimension}")]
    DuplicateHierarchy { dimension: String, hierarchy: String },

    #[error("duplicate level {level} in hierarchy {hierarchy}")]
    DuplicateLevel { hierarchy: String, level: String },

    #[error("duplicate member: {0}")]
    DuplicateMember(String),

    #[error("invalid parent for member {member}: {reason}")]
    InvalidParent { member: String, reason: String },

    #[error("member {member} does not belong to hierarchy {hierarchy}")]
    ForeignMember { member: String, hierarchy: String },
}
