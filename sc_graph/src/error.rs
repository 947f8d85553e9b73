use crate::axis::AxisName;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while declaring, validating or flattening a workflow.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("axis '{axis}' is declared more than once in workflow scope")]
    AxisRedeclared { axis: AxisName },

    #[error("axis '{axis}' has duplicate value '{value}'")]
    DuplicateAxisValue { axis: AxisName, value: String },

    #[error("'{node}' uses axis '{axis}' which is not declared in this workflow scope")]
    UnboundAxis { node: String, axis: AxisName },

    #[error("'{node}': axis mismatch for '{artifact}': {detail}")]
    AxisMismatch {
        node: String,
        artifact: String,
        detail: String,
    },

    #[error("'{node}' reads artifact '{artifact}' which no task produces and no file or port provides")]
    UndeclaredArtifact { node: String, artifact: String },

    #[error("artifact '{artifact}' is produced by both '{first}' and '{second}'")]
    DuplicateProducer {
        artifact: String,
        first: String,
        second: String,
    },

    #[error("node name '{name}' is used more than once")]
    DuplicateNode { name: String },

    #[error("artifact '{artifact}' is declared inconsistently: {detail}")]
    ConflictingDeclaration { artifact: String, detail: String },

    #[error("dependency cycle through '{node}'")]
    Cycle { node: String },

    #[error("sub-workflow '{node}' leaves port '{port}' unbound")]
    UnboundPort { node: String, port: String },

    #[error("sub-workflow '{node}' has no port named '{port}'")]
    UnknownPort { node: String, port: String },

    #[error("no filename for '{artifact}' at {key}")]
    MissingFilename { artifact: String, key: String },

    #[error("job '{job}' has no argument '{arg}' of the expected kind")]
    MissingArgument { job: String, arg: String },

    #[error("job '{job}' finished without producing {}", .path.display())]
    MissingOutput { job: String, path: PathBuf },
}
