use thiserror::Error;

/// The kind of the error of the hala-meshlet-renderer crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HalaRendererErrorKind {
  /// The asset file is malformed or truncated.
  AssetCorrupt,
  /// The asset file carries an unknown format tag or version.
  UnsupportedVersion,
  /// A meshlet or subset does not fit the per-group capacity.
  CapacityViolation,
  /// A single instance needs more groups than one dispatch allows.
  DispatchOverflow,
  /// A LOD slot holds no asset.
  MissingLod,
  /// The configuration is invalid.
  Config,
  /// The file system failed.
  Io,
  /// The rendering host failed.
  Device,
}

/// The error type of the hala-meshlet-renderer crate.
#[derive(Error, Debug)]
pub struct HalaRendererError {
  kind: HalaRendererErrorKind,
  msg: String,
  #[source]
  source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// The implementation of the error type of the hala-meshlet-renderer crate.
impl HalaRendererError {
  /// Create a new error.
  /// param kind: The kind of the error.
  /// param msg: The message of the error.
  /// param source: The source of the error.
  /// return: The error.
  pub fn new(
    kind: HalaRendererErrorKind,
    msg: &str,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
  ) -> Self {
    Self {
      kind,
      msg: msg.to_string(),
      source,
    }
  }

  pub fn asset_corrupt(msg: &str) -> Self {
    Self::new(HalaRendererErrorKind::AssetCorrupt, msg, None)
  }

  pub fn unsupported_version(msg: &str) -> Self {
    Self::new(HalaRendererErrorKind::UnsupportedVersion, msg, None)
  }

  pub fn capacity_violation(msg: &str) -> Self {
    Self::new(HalaRendererErrorKind::CapacityViolation, msg, None)
  }

  pub fn dispatch_overflow(msg: &str) -> Self {
    Self::new(HalaRendererErrorKind::DispatchOverflow, msg, None)
  }

  pub fn missing_lod(msg: &str) -> Self {
    Self::new(HalaRendererErrorKind::MissingLod, msg, None)
  }

  pub fn config(msg: &str) -> Self {
    Self::new(HalaRendererErrorKind::Config, msg, None)
  }

  /// Create an error reported by the rendering host.
  /// param msg: The message of the error.
  /// param source: The source of the error.
  /// return: The error.
  pub fn device(msg: &str, source: Option<Box<dyn std::error::Error + Send + Sync>>) -> Self {
    Self::new(HalaRendererErrorKind::Device, msg, source)
  }

  pub fn kind(&self) -> HalaRendererErrorKind {
    self.kind
  }

  pub fn message(&self) -> &str {
    &self.msg
  }

  /// Whether the error aborts the load of one asset only.
  /// return: True for the asset load errors.
  pub fn is_asset_error(&self) -> bool {
    matches!(
      self.kind,
      HalaRendererErrorKind::AssetCorrupt
        | HalaRendererErrorKind::UnsupportedVersion
        | HalaRendererErrorKind::CapacityViolation
        | HalaRendererErrorKind::Io
    )
  }
}

impl std::convert::From<std::io::Error> for HalaRendererError {
  fn from(err: std::io::Error) -> Self {
    Self {
      kind: HalaRendererErrorKind::Io,
      msg: err.to_string(),
      source: Some(Box::new(err)),
    }
  }
}

impl std::convert::From<serde_json::Error> for HalaRendererError {
  fn from(err: serde_json::Error) -> Self {
    Self {
      kind: HalaRendererErrorKind::Config,
      msg: err.to_string(),
      source: Some(Box::new(err)),
    }
  }
}

/// The implementation Display trait for the error type of the hala-meshlet-renderer crate.
impl std::fmt::Display for HalaRendererError {
  /// Format the error.
  /// param f: The formatter.
  /// return: The result.
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{:?}: {}", self.kind, self.msg)
  }
}
