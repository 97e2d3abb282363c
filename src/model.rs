use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the pseudo-subject carrying the flat all-subjects price.
pub const ALL_SUBJECTS: &str = "All";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectWithFee {
    pub name: String,
    pub fee: f64,
}

/// Priced subject catalog for one grade. Field names follow the
/// `fee_structure` table shape the front end already reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeStructure {
    #[serde(default)]
    pub id: String,
    pub grades: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default)]
    pub subjects_with_fee: Vec<SubjectWithFee>,
}

impl FeeStructure {
    pub fn subject_fee(&self, name: &str) -> Option<f64> {
        self.subjects_with_fee
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.fee)
    }

    pub fn all_fee(&self) -> f64 {
        self.subject_fee(ALL_SUBJECTS).unwrap_or(0.0)
    }

    /// Subjects that can be picked one by one.
    pub fn selectable_subjects(&self) -> impl Iterator<Item = &SubjectWithFee> {
        self.subjects_with_fee
            .iter()
            .filter(|s| s.name != ALL_SUBJECTS)
    }

    /// Fee of an individually priced subject; `None` for `"All"`.
    pub fn selectable_subject_fee(&self, name: &str) -> Option<f64> {
        self.selectable_subjects()
            .find(|s| s.name == name)
            .map(|s| s.fee)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StudyMode {
    OnCampus,
    Online,
    HomeTuition,
}

impl StudyMode {
    pub const ALL: [StudyMode; 3] = [Self::OnCampus, Self::Online, Self::HomeTuition];

    pub fn label(self) -> &'static str {
        match self {
            Self::OnCampus => "On Campus",
            Self::Online => "Online",
            Self::HomeTuition => "Home Tuition",
        }
    }
}

impl fmt::Display for StudyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for StudyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "On Campus" => Ok(Self::OnCampus),
            "Online" | "Individual Focus / Online" => Ok(Self::Online),
            "Home Tuition" => Ok(Self::HomeTuition),
            other => Err(format!("unknown study mode: {}", other)),
        }
    }
}

impl Serialize for StudyMode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for StudyMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    All,
    Selective,
}

impl FromStr for SubjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(Self::All),
            "selective" => Ok(Self::Selective),
            other => Err(format!("unknown subject type: {}", other)),
        }
    }
}

/// One enrolling sibling. Fields stay unset (`""` / `None`) until the wizard
/// reaches the matching step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiblingDetail {
    #[serde(default)]
    pub grade: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub mode: Option<StudyMode>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub subject_type: Option<SubjectType>,
    #[serde(default)]
    pub subjects: Vec<String>,
}

impl SiblingDetail {
    /// Distinct subject names, first occurrence wins.
    pub fn distinct_subjects(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::with_capacity(self.subjects.len());
        for s in &self.subjects {
            if !out.contains(&s.as_str()) {
                out.push(s.as_str());
            }
        }
        out
    }
}

/// Payload handed over when the wizard finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentSubmission {
    pub siblings: usize,
    pub details: Vec<SiblingDetail>,
    #[serde(default)]
    pub ac_charges: bool,
    #[serde(default)]
    pub deserving_discount: bool,
}

// The front end allocates empty siblings as `{grade: "", mode: ""}`.
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr<Err = String>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
