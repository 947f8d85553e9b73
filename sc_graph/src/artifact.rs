//! File-backed references declared by tasks and sub-workflows.

use crate::axis::{AxisName, Instance};
use crate::error::GraphError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};

/// Where the file(s) of an artifact live.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileNames {
    /// Temporary; the planner chooses a path under the temp root.
    Managed,
    /// A single fixed path.
    Path(PathBuf),
    /// One path per value of the artifact's single axis.
    PerValue(BTreeMap<String, PathBuf>),
    /// A path with `{axis}` placeholders.
    Template(String),
    /// Bound by the parent workflow through a sub-workflow port.
    Port(String),
}

/// A reference to an artifact as written in a task or binding declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub(crate) name: String,
    pub(crate) axes: Vec<AxisName>,
    pub(crate) fnames: Option<FileNames>,
    pub(crate) temp: bool,
    pub(crate) extensions: Vec<String>,
}

impl Artifact {
    /// An axis-free file at a fixed path. The path doubles as its name.
    pub fn file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Artifact {
            name: path.display().to_string(),
            axes: Vec::new(),
            fnames: Some(FileNames::Path(path.to_path_buf())),
            temp: false,
            extensions: Vec::new(),
        }
    }

    /// A temporary artifact managed by the planner.
    pub fn temp(name: impl Into<String>) -> Self {
        Artifact {
            name: name.into(),
            axes: Vec::new(),
            fnames: Some(FileNames::Managed),
            temp: true,
            extensions: Vec::new(),
        }
    }

    /// A named artifact whose location is given elsewhere, either by another
    /// reference or by `WorkflowBuilder::set_filenames`.
    pub fn named(name: impl Into<String>) -> Self {
        Artifact {
            name: name.into(),
            axes: Vec::new(),
            fnames: None,
            temp: false,
            extensions: Vec::new(),
        }
    }

    pub(crate) fn port(name: impl Into<String>) -> Self {
        let name = name.into();
        Artifact {
            fnames: Some(FileNames::Port(name.clone())),
            name,
            axes: Vec::new(),
            temp: false,
            extensions: Vec::new(),
        }
    }

    pub fn axis(mut self, axis: impl Into<AxisName>) -> Self {
        self.axes.push(axis.into());
        self
    }

    pub fn axes<A: Into<AxisName>>(mut self, axes: impl IntoIterator<Item = A>) -> Self {
        self.axes.extend(axes.into_iter().map(Into::into));
        self
    }

    /// One path per axis value.
    pub fn fnames<K: Display, P: Into<PathBuf>>(
        mut self,
        fnames: impl IntoIterator<Item = (K, P)>,
    ) -> Self {
        self.fnames = Some(FileNames::PerValue(
            fnames
                .into_iter()
                .map(|(k, p)| (k.to_string(), p.into()))
                .collect(),
        ));
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.fnames = Some(FileNames::Template(template.into()));
        self
    }

    /// Companion files that accompany every path of this artifact, given as
    /// suffixes such as `.bai`.
    pub fn extensions<S: Into<String>>(mut self, exts: impl IntoIterator<Item = S>) -> Self {
        self.extensions.extend(exts.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn axis_names(&self) -> &[AxisName] {
        &self.axes
    }

    pub fn is_temp(&self) -> bool {
        self.temp
    }
}

/// The reconciled declaration of an artifact within one workflow scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArtifactDecl {
    pub name: String,
    pub axes: Vec<AxisName>,
    pub location: Option<FileNames>,
    pub temp: bool,
    pub extensions: Vec<String>,
}

impl ArtifactDecl {
    pub(crate) fn from_ref(r: &Artifact) -> Self {
        ArtifactDecl {
            name: r.name.clone(),
            axes: r.axes.clone(),
            location: r.fnames.clone(),
            temp: r.temp,
            extensions: r.extensions.clone(),
        }
    }

    /// Fold another reference to the same name into this declaration.
    pub(crate) fn reconcile(&mut self, r: &Artifact) -> Result<(), GraphError> {
        let conflict = |detail: String| GraphError::ConflictingDeclaration {
            artifact: self.name.clone(),
            detail,
        };
        if self.axes != r.axes {
            return Err(conflict(format!(
                "axes {:?} vs {:?}",
                self.axes.iter().map(AxisName::as_str).collect::<Vec<_>>(),
                r.axes.iter().map(AxisName::as_str).collect::<Vec<_>>()
            )));
        }
        if self.temp != r.temp {
            return Err(conflict("temporary and non-temporary references".into()));
        }
        match (&self.location, &r.fnames) {
            (Some(a), Some(b)) if a != b => {
                return Err(conflict("two different file locations".into()));
            }
            (None, Some(b)) => self.location = Some(b.clone()),
            _ => {}
        }
        for ext in &r.extensions {
            if !self.extensions.contains(ext) {
                self.extensions.push(ext.clone());
            }
        }
        Ok(())
    }

    /// Path of the file at `coords`, which must fix every axis of the artifact.
    /// Managed and port locations are resolved by the planner.
    pub(crate) fn fixed_path(&self, coords: &Instance) -> Result<Option<PathBuf>, GraphError> {
        let missing = |key: String| GraphError::MissingFilename {
            artifact: self.name.clone(),
            key,
        };
        match &self.location {
            Some(FileNames::Path(p)) => Ok(Some(p.clone())),
            Some(FileNames::PerValue(map)) => {
                let [axis] = self.axes.as_slice() else {
                    return Err(missing(format!(
                        "per-value filenames need exactly one axis, found {}",
                        self.axes.len()
                    )));
                };
                let value = coords
                    .get(axis)
                    .ok_or_else(|| missing(format!("unset axis {axis}")))?;
                map.get(value)
                    .cloned()
                    .map(Some)
                    .ok_or_else(|| missing(format!("{axis}={value}")))
            }
            Some(FileNames::Template(t)) => {
                let mut path = t.clone();
                for axis in &self.axes {
                    let value = coords
                        .get(axis)
                        .ok_or_else(|| missing(format!("unset axis {axis}")))?;
                    path = path.replace(&format!("{{{axis}}}"), value);
                }
                Ok(Some(PathBuf::from(path)))
            }
            Some(FileNames::Managed) | Some(FileNames::Port(_)) | None => Ok(None),
        }
    }
}

/// `path` with `ext` appended verbatim, e.g. `a.bam` + `.bai` = `a.bam.bai`.
pub fn companion_path(path: &Path, ext: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(ext);
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_value_path() {
        let art = Artifact::named("bam")
            .axis("cell_id")
            .fnames([("A", "/data/A.bam"), ("B", "/data/B.bam")]);
        let decl = ArtifactDecl::from_ref(&art);
        let coords = Instance::new().with("cell_id", "B");
        assert_eq!(
            decl.fixed_path(&coords).unwrap(),
            Some(PathBuf::from("/data/B.bam"))
        );
        let missing = Instance::new().with("cell_id", "C");
        assert!(matches!(
            decl.fixed_path(&missing),
            Err(GraphError::MissingFilename { .. })
        ));
    }

    #[test]
    fn test_template_path() {
        let art = Artifact::named("merged.bam")
            .axes(["region"])
            .template("/out/{region}.bam");
        let decl = ArtifactDecl::from_ref(&art);
        let coords = Instance::new().with("region", "1-1-1000");
        assert_eq!(
            decl.fixed_path(&coords).unwrap(),
            Some(PathBuf::from("/out/1-1-1000.bam"))
        );
    }

    #[test]
    fn test_reconcile() {
        let mut decl = ArtifactDecl::from_ref(&Artifact::named("seqdata.h5").axis("cell_id"));
        decl.reconcile(
            &Artifact::named("seqdata.h5")
                .axis("cell_id")
                .fnames([("A", "A.h5")])
                .extensions([".tmp"]),
        )
        .unwrap();
        assert!(matches!(decl.location, Some(FileNames::PerValue(_))));
        assert_eq!(decl.extensions, vec![".tmp"]);

        let err = decl
            .reconcile(&Artifact::named("seqdata.h5"))
            .unwrap_err();
        assert!(matches!(err, GraphError::ConflictingDeclaration { .. }));
    }

    #[test]
    fn test_companion_path() {
        assert_eq!(
            companion_path(Path::new("/x/a.bam"), ".bai"),
            PathBuf::from("/x/a.bam.bai")
        );
    }
}
