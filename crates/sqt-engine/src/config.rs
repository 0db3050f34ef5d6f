use serde::{Deserialize, Serialize};
use sqt_core::error::{ScatterError, ScatterResult};
use sqt_core::geom::Vec3;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScatterConfig {
    pub scattering: ScatteringConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScatteringConfig {
    /// Selection name the calculation runs over.
    pub target: String,
    /// Coherent all-atom scattering or incoherent self scattering.
    #[serde(default, rename = "type")]
    pub kind: ScatteringKind,
    /// Post-align every frame to the selection centroid.
    #[serde(default)]
    pub center: bool,
    #[serde(default)]
    pub background: bool,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub average: AverageConfig,
    /// Momentum transfer vectors to evaluate.
    #[serde(default)]
    pub qvectors: Vec<[f64; 3]>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScatteringKind {
    #[default]
    All,
    #[serde(rename = "self")]
    SelfKind,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct CorrelationConfig {
    #[serde(default, rename = "type")]
    pub kind: CorrelationType,
    #[serde(default)]
    pub method: CorrelationMethod,
    #[serde(default)]
    pub zeromean: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationType {
    #[default]
    None,
    Time,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    #[default]
    Direct,
    Fftw,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct AverageConfig {
    #[serde(default)]
    pub orientation: OrientationConfig,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct OrientationConfig {
    #[serde(default, rename = "type")]
    pub kind: OrientationType,
    #[serde(default)]
    pub multipole: MultipoleConfig,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrientationType {
    #[default]
    Vectors,
    Multipole,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MultipoleConfig {
    #[serde(default, rename = "type")]
    pub kind: MultipoleKind,
    #[serde(default)]
    pub resolution: usize,
    #[serde(default = "default_axis")]
    pub axis: [f64; 3],
}

impl Default for MultipoleConfig {
    fn default() -> Self {
        Self {
            kind: MultipoleKind::Sphere,
            resolution: 0,
            axis: default_axis(),
        }
    }
}

fn default_axis() -> [f64; 3] {
    [0.0, 0.0, 1.0]
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultipoleKind {
    #[default]
    Sphere,
    Cylinder,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_matrix_bytes")]
    pub scattering_matrix: usize,
    #[serde(default = "default_coordinate_bytes")]
    pub coordinate_sets: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            scattering_matrix: default_matrix_bytes(),
            coordinate_sets: default_coordinate_bytes(),
        }
    }
}

fn default_matrix_bytes() -> usize {
    256 * 1024 * 1024
}

fn default_coordinate_bytes() -> usize {
    512 * 1024 * 1024
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Worker threads per node; hardware concurrency when unset.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Cap on the number of independent partitions.
    #[serde(default)]
    pub partitions: Option<usize>,
}

/// Kernel family selected by the orientation/type combination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelFamily {
    AllVectors,
    SelfVectors,
    MultipoleSphere,
    MultipoleCylinder,
}

impl ScatterConfig {
    pub fn from_json(text: &str) -> ScatterResult<Self> {
        let cfg: ScatterConfig = serde_json::from_str(text)
            .map_err(|e| ScatterError::Config(format!("config parse: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ScatterResult<()> {
        if self.scattering.target.is_empty() {
            return Err(ScatterError::Config("scattering.target is empty".into()));
        }
        if self.scattering.qvectors.is_empty() {
            return Err(ScatterError::Config("scattering.qvectors is empty".into()));
        }
        let axis = Vec3::from_array(self.scattering.average.orientation.multipole.axis);
        if axis.unit().is_none() {
            return Err(ScatterError::Config(
                "scattering.average.orientation.multipole.axis must be non-zero".into(),
            ));
        }
        self.kernel_family().map(|_| ())
    }

    pub fn kernel_family(&self) -> ScatterResult<KernelFamily> {
        let orientation = self.scattering.average.orientation;
        match (self.scattering.kind, orientation.kind) {
            (ScatteringKind::All, OrientationType::Vectors) => Ok(KernelFamily::AllVectors),
            (ScatteringKind::SelfKind, OrientationType::Vectors) => Ok(KernelFamily::SelfVectors),
            (ScatteringKind::All, OrientationType::Multipole) => match orientation.multipole.kind {
                MultipoleKind::Sphere => Ok(KernelFamily::MultipoleSphere),
                MultipoleKind::Cylinder => Ok(KernelFamily::MultipoleCylinder),
            },
            (ScatteringKind::SelfKind, OrientationType::Multipole) => Err(ScatterError::Config(
                "self scattering does not combine with multipole averaging".into(),
            )),
        }
    }

    pub fn multipole_axis(&self) -> Vec3 {
        Vec3::from_array(self.scattering.average.orientation.multipole.axis)
    }

    pub fn resolution(&self) -> usize {
        self.scattering.average.orientation.multipole.resolution
    }

    pub fn qvectors(&self) -> Vec<Vec3> {
        self.scattering
            .qvectors
            .iter()
            .map(|&q| Vec3::from_array(q))
            .collect()
    }

    pub fn worker_count(&self) -> usize {
        self.runtime.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let cfg = ScatterConfig::from_json(
            r#"{
                "scattering": {
                    "target": "protein",
                    "qvectors": [[0.1, 0.0, 0.0]]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.scattering.correlation.kind, CorrelationType::None);
        assert_eq!(cfg.kernel_family().unwrap(), KernelFamily::AllVectors);
        assert!(cfg.limits.memory.scattering_matrix > 0);
    }

    #[test]
    fn parses_full_option_tree() {
        let cfg = ScatterConfig::from_json(
            r#"{
                "scattering": {
                    "target": "water",
                    "type": "self",
                    "center": true,
                    "correlation": {"type": "time", "method": "fftw", "zeromean": true},
                    "qvectors": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
                },
                "limits": {"memory": {"scattering_matrix": 1024, "coordinate_sets": 2048}},
                "runtime": {"workers": 3, "partitions": 2}
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.kernel_family().unwrap(), KernelFamily::SelfVectors);
        assert_eq!(cfg.scattering.correlation.method, CorrelationMethod::Fftw);
        assert!(cfg.scattering.correlation.zeromean);
        assert_eq!(cfg.limits.memory.scattering_matrix, 1024);
        assert_eq!(cfg.worker_count(), 3);
    }

    #[test]
    fn rejects_zero_axis() {
        let err = ScatterConfig::from_json(
            r#"{
                "scattering": {
                    "target": "all",
                    "qvectors": [[1.0, 0.0, 0.0]],
                    "average": {"orientation": {"type": "multipole",
                        "multipole": {"type": "cylinder", "resolution": 2, "axis": [0, 0, 0]}}}
                }
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ScatterError::Config(_)));
    }

    #[test]
    fn rejects_self_multipole() {
        let err = ScatterConfig::from_json(
            r#"{
                "scattering": {
                    "target": "all",
                    "type": "self",
                    "qvectors": [[1.0, 0.0, 0.0]],
                    "average": {"orientation": {"type": "multipole"}}
                }
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ScatterError::Config(_)));
    }
}
