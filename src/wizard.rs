//! Sibling enrollment wizard.
//!
//! Steps run `siblings -> (grade -> mode -> subjects)* -> summary`, once per
//! sibling. Every user action is a [`WizardEvent`] fed to
//! [`Wizard::transition`], which either moves to the next [`WizardStep`] or
//! rejects the event with a [`WizardError`] and leaves the state untouched.

use crate::calc::{self, FeeAdjustments, FeeBreakdown, FeeRules};
use crate::catalog;
use crate::model::{
    EnrollmentSubmission, FeeStructure, SiblingDetail, StudyMode, SubjectType, SubjectWithFee,
    ALL_SUBJECTS,
};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_MAX_SIBLINGS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WizardStep {
    Siblings,
    Grade,
    Mode,
    Subjects,
    Summary,
}

impl WizardStep {
    /// Position in the four-stage progress bar; `-1` before it is shown.
    pub fn active_index(self) -> i64 {
        match self {
            Self::Siblings => -1,
            Self::Grade => 0,
            Self::Mode => 1,
            Self::Subjects => 2,
            Self::Summary => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WizardEvent {
    SelectSiblings { count: i64 },
    SelectGrade { grade: String },
    SelectMode { mode: StudyMode },
    #[serde(rename_all = "camelCase")]
    SelectSubjectType { subject_type: SubjectType },
    ToggleSubject { name: String },
    Next,
    Back,
    SetAcCharges { enabled: bool },
    SetDeservingDiscount { enabled: bool },
}

#[derive(Debug, Clone, Serialize)]
pub struct WizardError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl WizardError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn invalid_step(step: WizardStep, action: &str) -> Self {
        Self {
            code: "invalid_step".to_string(),
            message: format!("{} is not allowed in step {:?}", action, step),
            details: Some(serde_json::json!({ "step": step })),
        }
    }

    fn incomplete(field: &str) -> Self {
        Self {
            code: "incomplete_step".to_string(),
            message: format!("{} must be chosen before continuing", field),
            details: Some(serde_json::json!({ "field": field })),
        }
    }
}

impl fmt::Display for WizardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for WizardError {}

/// Serializable picture of the wizard for the UI layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardView {
    pub step: WizardStep,
    pub active_step_index: i64,
    pub title: String,
    pub siblings: usize,
    pub current_sibling: usize,
    pub details: Vec<SiblingDetail>,
    pub grade_options: Vec<String>,
    pub mode_options: Vec<StudyMode>,
    pub subject_options: Vec<SubjectWithFee>,
    pub can_advance: bool,
    pub ac_charges: bool,
    pub deserving_discount: bool,
    pub breakdown: FeeBreakdown,
}

#[derive(Debug, Clone)]
pub struct Wizard {
    catalog: Vec<FeeStructure>,
    rules: FeeRules,
    max_siblings: usize,
    step: WizardStep,
    siblings: usize,
    current: usize,
    details: Vec<SiblingDetail>,
    adjustments: FeeAdjustments,
}

impl Wizard {
    pub fn new(mut catalog: Vec<FeeStructure>, rules: FeeRules, max_siblings: usize) -> Self {
        catalog::normalize_catalog(&mut catalog);
        Self {
            catalog,
            rules,
            max_siblings,
            step: WizardStep::Siblings,
            siblings: 0,
            current: 0,
            details: Vec::new(),
            adjustments: FeeAdjustments::default(),
        }
    }

    #[cfg(test)]
    pub fn step(&self) -> WizardStep {
        self.step
    }

    #[cfg(test)]
    pub fn current_sibling(&self) -> usize {
        self.current
    }

    #[cfg(test)]
    pub fn details(&self) -> &[SiblingDetail] {
        &self.details
    }

    pub fn grade_options(&self) -> Vec<String> {
        catalog::grade_options(&self.catalog)
    }

    /// Individually priced subjects for the current sibling's grade.
    pub fn subject_options(&self) -> Vec<SubjectWithFee> {
        self.current_structure()
            .map(|fs| fs.selectable_subjects().cloned().collect())
            .unwrap_or_default()
    }

    fn current_structure(&self) -> Option<&FeeStructure> {
        let detail = self.details.get(self.current)?;
        calc::find_structure(&self.catalog, &detail.grade)
    }

    fn current_detail_mut(&mut self) -> Result<&mut SiblingDetail, WizardError> {
        let idx = self.current;
        self.details
            .get_mut(idx)
            .ok_or_else(|| WizardError::new("invalid_step", "no sibling is being edited"))
    }

    /// Whether `next` would be accepted right now.
    pub fn can_advance(&self) -> bool {
        match self.step {
            WizardStep::Grade | WizardStep::Mode | WizardStep::Subjects => {
                self.check_complete().is_ok()
            }
            WizardStep::Siblings | WizardStep::Summary => false,
        }
    }

    fn check_complete(&self) -> Result<(), WizardError> {
        let Some(d) = self.details.get(self.current) else {
            return Err(WizardError::incomplete("siblings"));
        };
        match self.step {
            WizardStep::Grade if d.grade.is_empty() => Err(WizardError::incomplete("grade")),
            WizardStep::Mode if d.mode.is_none() => Err(WizardError::incomplete("mode")),
            WizardStep::Subjects => match d.subject_type {
                None => Err(WizardError::incomplete("subjectType")),
                Some(SubjectType::Selective) if d.subjects.is_empty() => {
                    Err(WizardError::incomplete("subjects"))
                }
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    pub fn transition(&mut self, event: WizardEvent) -> Result<WizardStep, WizardError> {
        match event {
            WizardEvent::SelectSiblings { count } => self.select_siblings(count)?,
            WizardEvent::SelectGrade { grade } => self.select_grade(&grade)?,
            WizardEvent::SelectMode { mode } => {
                self.expect_step(WizardStep::Mode, "selectMode")?;
                self.current_detail_mut()?.mode = Some(mode);
                self.step = WizardStep::Subjects;
            }
            WizardEvent::SelectSubjectType { subject_type } => {
                self.expect_step(WizardStep::Subjects, "selectSubjectType")?;
                let d = self.current_detail_mut()?;
                d.subject_type = Some(subject_type);
                d.subjects = match subject_type {
                    SubjectType::All => vec![ALL_SUBJECTS.to_string()],
                    SubjectType::Selective => Vec::new(),
                };
            }
            WizardEvent::ToggleSubject { name } => self.toggle_subject(&name)?,
            WizardEvent::Next => self.next()?,
            WizardEvent::Back => self.back()?,
            WizardEvent::SetAcCharges { enabled } => self.adjustments.ac_charges = enabled,
            WizardEvent::SetDeservingDiscount { enabled } => {
                self.adjustments.deserving_discount = enabled
            }
        }
        Ok(self.step)
    }

    fn expect_step(&self, step: WizardStep, action: &str) -> Result<(), WizardError> {
        if self.step != step {
            return Err(WizardError::invalid_step(self.step, action));
        }
        Ok(())
    }

    fn select_siblings(&mut self, count: i64) -> Result<(), WizardError> {
        self.expect_step(WizardStep::Siblings, "selectSiblings")?;
        if count == 0 {
            self.reset();
            return Ok(());
        }
        if count < 0 || count as u64 > self.max_siblings as u64 {
            return Err(WizardError {
                code: "sibling_count_out_of_range".to_string(),
                message: format!("sibling count must be between 1 and {}", self.max_siblings),
                details: Some(serde_json::json!({ "count": count, "max": self.max_siblings })),
            });
        }
        let n = count as usize;
        self.siblings = n;
        self.details = vec![SiblingDetail::default(); n];
        self.current = 0;
        self.step = WizardStep::Grade;
        Ok(())
    }

    fn select_grade(&mut self, grade: &str) -> Result<(), WizardError> {
        self.expect_step(WizardStep::Grade, "selectGrade")?;
        let grade = grade.trim();
        if calc::find_structure(&self.catalog, grade).is_none() {
            return Err(WizardError {
                code: "unknown_grade".to_string(),
                message: format!("grade {} is not in the fee catalog", grade),
                details: Some(serde_json::json!({ "grade": grade })),
            });
        }
        let d = self.current_detail_mut()?;
        // Subject picks belong to the old grade's catalog.
        if d.grade != grade {
            d.subject_type = None;
            d.subjects.clear();
        }
        d.grade = grade.to_string();
        self.step = WizardStep::Mode;
        Ok(())
    }

    fn toggle_subject(&mut self, name: &str) -> Result<(), WizardError> {
        self.expect_step(WizardStep::Subjects, "toggleSubject")?;
        let known = self
            .current_structure()
            .map(|fs| fs.selectable_subjects().any(|s| s.name == name))
            .unwrap_or(false);
        let d = self.current_detail_mut()?;
        if d.subject_type != Some(SubjectType::Selective) {
            return Err(WizardError::new(
                "subject_type_not_selective",
                "choose selective subjects before toggling individual subjects",
            ));
        }
        if !known {
            return Err(WizardError {
                code: "unknown_subject".to_string(),
                message: format!("subject {} is not offered for grade {}", name, d.grade),
                details: Some(serde_json::json!({ "subject": name, "grade": d.grade })),
            });
        }
        if let Some(pos) = d.subjects.iter().position(|s| s == name) {
            d.subjects.remove(pos);
        } else {
            d.subjects.push(name.to_string());
        }
        Ok(())
    }

    fn next(&mut self) -> Result<(), WizardError> {
        match self.step {
            WizardStep::Siblings | WizardStep::Summary => {
                return Err(WizardError::invalid_step(self.step, "next"));
            }
            _ => {}
        }
        self.check_complete()?;
        self.step = match self.step {
            WizardStep::Grade => WizardStep::Mode,
            WizardStep::Mode => WizardStep::Subjects,
            _ if self.current + 1 < self.siblings => {
                self.current += 1;
                WizardStep::Grade
            }
            _ => WizardStep::Summary,
        };
        Ok(())
    }

    fn back(&mut self) -> Result<(), WizardError> {
        self.step = match self.step {
            WizardStep::Siblings => return Err(WizardError::invalid_step(self.step, "back")),
            WizardStep::Grade if self.current == 0 => WizardStep::Siblings,
            // Returns to the previous sibling's subjects, not its mode.
            WizardStep::Grade => {
                self.current -= 1;
                WizardStep::Subjects
            }
            WizardStep::Mode => WizardStep::Grade,
            WizardStep::Subjects => WizardStep::Mode,
            WizardStep::Summary => WizardStep::Subjects,
        };
        Ok(())
    }

    fn reset(&mut self) {
        self.step = WizardStep::Siblings;
        self.siblings = 0;
        self.current = 0;
        self.details.clear();
    }

    pub fn breakdown(&self) -> FeeBreakdown {
        calc::calculate_fee(&self.details, &self.catalog, &self.rules, self.adjustments)
    }

    #[cfg(test)]
    pub fn total(&self) -> f64 {
        self.breakdown().total
    }

    /// Completed payload; only available from the summary step.
    pub fn finish(&self) -> Result<EnrollmentSubmission, WizardError> {
        self.expect_step(WizardStep::Summary, "finish")?;
        Ok(EnrollmentSubmission {
            siblings: self.siblings,
            details: self.details.clone(),
            ac_charges: self.adjustments.ac_charges,
            deserving_discount: self.adjustments.deserving_discount,
        })
    }

    pub fn view(&self) -> WizardView {
        let title = match self.step {
            WizardStep::Summary | WizardStep::Siblings => String::new(),
            _ => format!("Sibling {} of {}", self.current + 1, self.siblings),
        };
        WizardView {
            step: self.step,
            active_step_index: self.step.active_index(),
            title,
            siblings: self.siblings,
            current_sibling: self.current,
            details: self.details.clone(),
            grade_options: self.grade_options(),
            mode_options: StudyMode::ALL.to_vec(),
            subject_options: self.subject_options(),
            can_advance: self.can_advance(),
            ac_charges: self.adjustments.ac_charges,
            deserving_discount: self.adjustments.deserving_discount,
            breakdown: self.breakdown(),
        }
    }
}
