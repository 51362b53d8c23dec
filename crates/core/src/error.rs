use crate::review::ReviewReport;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("invalid template name: {0}")]
    InvalidTemplateName(String),
    #[error("invalid template: {0}")]
    InvalidTemplate(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("selection not found in document: {0:?}")]
    SelectionNotFound(String),
    #[error("unterminated token in block {block}")]
    UnterminatedToken { block: usize },
    #[error("template is inconsistent with its document: {0}")]
    Inconsistent(Box<ReviewReport>),
    #[error("missing value for variable {0}")]
    MissingValue(String),
    #[error("template not found: {0}")]
    TemplateNotFound(String),
    #[error("malformed document: {0}")]
    MalformedDocument(String),
    #[error("failed to render document: {0}")]
    DocumentRender(String),

    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to read template file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write template file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),

    #[error("file storage error: {0}")]
    Files(#[from] contrato_files::FilesError),
    #[error("invalid text: {0}")]
    Text(#[from] contrato_types::TextError),
}

pub type TemplateResult<T> = std::result::Result<T, TemplateError>;
