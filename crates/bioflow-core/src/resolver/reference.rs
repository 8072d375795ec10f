use bioflow_types::error::ResolveError;

const WORKSPACE_PREFIX: &str = "workspace.";
const THIS_PREFIX: &str = "this.";

/// A parsed template value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference<'a> {
    /// Passed through unchanged.
    Literal,
    /// `workspace.<header>`
    Workspace(&'a str),
    /// `this.<seg>.<seg>...`
    This(Vec<&'a str>),
}

impl<'a> Reference<'a> {
    pub fn parse(value: &'a str) -> Result<Self, ResolveError> {
        if let Some(header) = value.strip_prefix(WORKSPACE_PREFIX) {
            if header.is_empty() || header.contains('.') {
                return Err(ResolveError::MalformedReference(value.to_string()));
            }
            return Ok(Reference::Workspace(header));
        }
        if let Some(path) = value.strip_prefix(THIS_PREFIX) {
            let segments: Vec<&str> = path.split('.').collect();
            if segments.iter().any(|s| s.is_empty()) {
                return Err(ResolveError::MalformedReference(value.to_string()));
            }
            return Ok(Reference::This(segments));
        }
        Ok(Reference::Literal)
    }

    /// Output templates write back a single column of the selected table.
    pub fn output_header(value: &'a str) -> Option<&'a str> {
        match Reference::parse(value) {
            Ok(Reference::This(segments)) if segments.len() == 1 => Some(segments[0]),
            _ => None,
        }
    }
}
