//! Package inspection pipeline: resolve, select, extract, inspect, render.

use std::collections::BTreeSet;
use std::path::PathBuf;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{AssetKind, Framework, MethodSurfaceEntry, PackageId, PackageVersion, TypeSurfaceEntry};
use crate::metadata::{LoadContext, MetadataError, MetadataInspector};
use crate::ops::extract::{ExtractError, ExtractionResult, SurfaceExtractor};
use crate::ops::select::ArtifactSelector;
use crate::render::{CSharpRenderer, DocProvider, NoDocs, SignatureRenderer, SurfaceRenderer};
use crate::resolver::{CompatibilityResolver, CompatibilityRules};
use crate::sources::{PackageSource, ResolvedPackage};
use crate::util::cancel::CancellationToken;
use crate::util::config::{Config, DEFAULT_FRAMEWORK_ASSEMBLIES, DEFAULT_TARGET_FRAMEWORK};

/// Inspection failed. Expected "nothing compatible" outcomes are not errors;
/// see [`InspectOutcome::NotCompatible`].
#[derive(Debug, Error, Diagnostic)]
pub enum InspectError {
    #[error("cannot resolve package `{package}`: {message}")]
    #[diagnostic(
        code(apiscope::inspect::resolve),
        help("check the `[feeds] paths` entries in your configuration")
    )]
    Resolve { package: String, message: String },

    #[error("{package} has no assets compatible with {target}")]
    #[diagnostic(
        code(apiscope::inspect::not_compatible),
        help("the package ships assets for: {available}")
    )]
    NotCompatible {
        package: String,
        target: Framework,
        available: String,
    },

    #[error(transparent)]
    #[diagnostic(code(apiscope::inspect::extract))]
    Extract(ExtractError),

    #[error("cannot read {artifact}: {source}")]
    #[diagnostic(
        code(apiscope::inspect::metadata),
        help("the package surface is not reported when any of its artifacts is unreadable")
    )]
    Metadata {
        artifact: String,
        #[source]
        source: MetadataError,
    },

    #[error("inspection cancelled")]
    #[diagnostic(code(apiscope::inspect::cancelled))]
    Cancelled,
}

impl From<ExtractError> for InspectError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Cancelled => InspectError::Cancelled,
            other => InspectError::Extract(other),
        }
    }
}

impl InspectError {
    fn metadata(artifact: &str, err: MetadataError) -> Self {
        match err {
            MetadataError::Cancelled => InspectError::Cancelled,
            source => InspectError::Metadata {
                artifact: artifact.to_string(),
                source,
            },
        }
    }
}

/// Settings for one inspection.
#[derive(Debug, Clone)]
pub struct InspectOptions {
    /// Ambient framework used to pick the nearest asset group
    pub target_framework: Framework,
    /// Only accept an asset group for exactly this framework
    pub framework: Option<Framework>,
    /// Assembly name patterns that always resolve
    pub framework_assemblies: Vec<String>,
    /// Parent of temporary workspaces (None = system temp dir)
    pub temp_root: Option<PathBuf>,
    pub rules: CompatibilityRules,
    pub cancel: CancellationToken,
}

impl Default for InspectOptions {
    fn default() -> Self {
        InspectOptions {
            target_framework: Framework::parse(DEFAULT_TARGET_FRAMEWORK)
                .unwrap_or_else(|_| Framework::net_core_app(8, 0)),
            framework: None,
            framework_assemblies: DEFAULT_FRAMEWORK_ASSEMBLIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            temp_root: None,
            rules: CompatibilityRules::default(),
            cancel: CancellationToken::new(),
        }
    }
}

impl InspectOptions {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(InspectOptions {
            target_framework: config.target_framework()?,
            framework: None,
            framework_assemblies: config.framework_assemblies(),
            temp_root: config.inspect.temp_root.clone(),
            rules: config.compat_rules()?,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_target(mut self, target: Framework) -> Self {
        self.target_framework = target;
        self
    }

    pub fn with_framework(mut self, framework: Framework) -> Self {
        self.framework = Some(framework);
        self
    }

    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(temp_root.into());
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// The public surface of one package version for one framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSurface {
    pub package: PackageId,
    pub framework: Framework,
    /// Name of the asset group inspected (`ref/netstandard2.0`)
    pub group: String,
    pub kind: AssetKind,
    /// File names of the inspected binaries
    pub artifacts: Vec<String>,
    /// Sorted by namespace, then name
    pub types: Vec<TypeSurfaceEntry>,
    /// Sorted by owning type, then overload key
    pub methods: Vec<MethodSurfaceEntry>,
    /// Visible types left out because they failed to load
    pub skipped_types: usize,
}

/// What an inspection found.
#[derive(Debug, Clone, PartialEq)]
pub enum InspectOutcome {
    Surface(PackageSurface),
    /// No asset group serves the requested framework
    NotCompatible {
        package: PackageId,
        target: Framework,
        available: Vec<Framework>,
    },
}

impl InspectOutcome {
    pub fn surface(&self) -> Option<&PackageSurface> {
        match self {
            InspectOutcome::Surface(surface) => Some(surface),
            InspectOutcome::NotCompatible { .. } => None,
        }
    }

    /// Treat "not compatible" as an error.
    pub fn into_surface(self) -> Result<PackageSurface, InspectError> {
        match self {
            InspectOutcome::Surface(surface) => Ok(surface),
            InspectOutcome::NotCompatible {
                package,
                target,
                available,
            } => Err(InspectError::NotCompatible {
                package: package.to_string(),
                target,
                available: if available.is_empty() {
                    "nothing".to_string()
                } else {
                    available
                        .iter()
                        .map(|f| f.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                },
            }),
        }
    }
}

/// Runs the inspection pipeline against a package source.
#[derive(Clone, Copy)]
pub struct PackageInspector<'a> {
    source: &'a dyn PackageSource,
    options: &'a InspectOptions,
    signatures: &'a dyn SignatureRenderer,
    docs: &'a dyn DocProvider,
}

impl<'a> PackageInspector<'a> {
    /// An inspector rendering C# signatures without documentation.
    pub fn new(source: &'a dyn PackageSource, options: &'a InspectOptions) -> Self {
        PackageInspector {
            source,
            options,
            signatures: &CSharpRenderer,
            docs: &NoDocs,
        }
    }

    pub fn with_docs(mut self, docs: &'a dyn DocProvider) -> Self {
        self.docs = docs;
        self
    }

    pub fn with_signatures(mut self, signatures: &'a dyn SignatureRenderer) -> Self {
        self.signatures = signatures;
        self
    }

    pub fn options(&self) -> &InspectOptions {
        self.options
    }

    /// Resolve a package from the source.
    pub fn resolve(&self, id: &str, version: Option<&PackageVersion>) -> Result<ResolvedPackage, InspectError> {
        self.source
            .resolve(id, version)
            .map_err(|e| InspectError::Resolve {
                package: id.to_string(),
                message: format!("{:#}", e),
            })
    }

    /// Resolve and inspect a package version (`None` = latest).
    pub fn inspect(&self, id: &str, version: Option<&PackageVersion>) -> Result<InspectOutcome, InspectError> {
        let resolved = self.resolve(id, version)?;
        self.inspect_resolved(&resolved, self.options.framework.as_ref())
    }

    /// Inspect an already resolved package.
    ///
    /// The temporary workspace is removed before this returns, whatever the
    /// outcome.
    pub fn inspect_resolved(
        &self,
        resolved: &ResolvedPackage,
        explicit: Option<&Framework>,
    ) -> Result<InspectOutcome, InspectError> {
        let package = &resolved.package;
        tracing::info!("inspecting {}", package);

        let selector = ArtifactSelector::new(
            self.options.target_framework.clone(),
            CompatibilityResolver::new(self.options.rules.clone()),
        );
        let Some(group) = selector.select_group(&resolved.groups, explicit) else {
            let target = explicit.unwrap_or(selector.target()).clone();
            let available: BTreeSet<Framework> =
                resolved.groups.iter().map(|g| g.framework.clone()).collect();
            tracing::info!("{} has no assets compatible with {}", package, target);
            return Ok(InspectOutcome::NotCompatible {
                package: package.clone(),
                target,
                available: available.into_iter().collect(),
            });
        };

        let extraction = SurfaceExtractor::new(self.options.temp_root.clone())
            .with_cancellation(self.options.cancel.clone())
            .extract(Some(group))?;
        if let Some(issue) = &extraction.issue {
            tracing::info!("{}: {}", package, issue);
        }

        let surface = self.inspect_extraction(&extraction);
        extraction.release();
        let (types, methods, skipped_types) = surface?;

        tracing::info!(
            "{}: {} type(s), {} method(s) from {}",
            package,
            types.len(),
            methods.len(),
            group.name
        );

        Ok(InspectOutcome::Surface(PackageSurface {
            package: package.clone(),
            framework: group.framework.clone(),
            group: group.name.clone(),
            kind: group.kind,
            artifacts: group
                .binaries()
                .filter_map(|a| a.file_name())
                .map(str::to_string)
                .collect(),
            types,
            methods,
            skipped_types,
        }))
    }

    #[allow(clippy::type_complexity)]
    fn inspect_extraction(
        &self,
        extraction: &ExtractionResult,
    ) -> Result<(Vec<TypeSurfaceEntry>, Vec<MethodSurfaceEntry>, usize), InspectError> {
        let mut context = LoadContext::new(&self.options.framework_assemblies);
        context.add_artifacts(&extraction.artifacts);

        let inspector = MetadataInspector::new(&context).with_cancellation(self.options.cancel.clone());
        let renderer = SurfaceRenderer::new(self.signatures, self.docs);

        let mut types = Vec::new();
        let mut methods = Vec::new();
        let mut skipped = 0;

        for path in &extraction.artifacts {
            let artifact = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            let assembly = inspector
                .open(path)
                .map_err(|e| InspectError::metadata(&artifact, e))?;
            let scan = assembly
                .scan_types()
                .map_err(|e| InspectError::metadata(&artifact, e))?;
            skipped += scan.skipped.len();

            for ty in &scan.types {
                let raw = assembly
                    .extract_public_members(ty)
                    .map_err(|e| InspectError::metadata(&artifact, e))?;
                methods.extend(renderer.render_all(&raw));
            }
            types.extend(scan.types);
        }

        types.sort();
        methods.sort_by(|a, b| {
            a.identity()
                .cmp(&b.identity())
                .then_with(|| a.signature.cmp(&b.signature))
        });
        Ok((types, methods, skipped))
    }
}

/// Resolve and inspect one package version.
pub fn inspect_package(
    source: &dyn PackageSource,
    id: &str,
    version: Option<&PackageVersion>,
    options: &InspectOptions,
) -> Result<InspectOutcome, InspectError> {
    PackageInspector::new(source, options).inspect(id, version)
}
