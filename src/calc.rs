use crate::model::{FeeStructure, SiblingDetail, StudyMode, SubjectType, ALL_SUBJECTS};
use serde::{Deserialize, Serialize};

/// Half-up rounding to the nearest multiple of `step`:
/// `Int(x / step + 0.5) * step`
pub fn round_to_step(x: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return x;
    }
    ((x / step) + 0.5).floor() * step
}

/// Renders an amount with `,` thousands separators and at most three
/// fraction digits, e.g. `1234500` -> `"1,234,500"`.
pub fn format_amount(x: f64) -> String {
    let negative = x < 0.0;
    let scaled = (x.abs() * 1000.0).round() as u128;
    let whole = scaled / 1000;
    let frac = scaled % 1000;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let mut out = String::new();
    if negative && scaled > 0 {
        out.push('-');
    }
    out.push_str(&grouped);
    if frac > 0 {
        let f = format!("{:03}", frac);
        out.push('.');
        out.push_str(f.trim_end_matches('0'));
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountDiscount {
    pub count: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeMultipliers {
    pub on_campus: f64,
    pub online: f64,
    pub home_tuition: f64,
}

impl ModeMultipliers {
    pub fn for_mode(&self, mode: Option<StudyMode>) -> f64 {
        match mode {
            Some(StudyMode::OnCampus) => self.on_campus,
            Some(StudyMode::Online) => self.online,
            Some(StudyMode::HomeTuition) => self.home_tuition,
            None => 1.0,
        }
    }
}

/// Pricing rules. `Default` is the production rule set: tiered subject and
/// sibling discounts, AC surcharge, scholarship, rounding to 500.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRules {
    pub subject_discounts: Vec<CountDiscount>,
    pub max_individual_subjects: usize,
    pub mode_multipliers: ModeMultipliers,
    pub sibling_discounts: Vec<CountDiscount>,
    pub rounding_step: f64,
    pub ac_charge_per_sibling: f64,
    pub deserving_discount_percent: f64,
}

impl Default for FeeRules {
    fn default() -> Self {
        Self {
            subject_discounts: vec![
                CountDiscount { count: 2, percent: 20.0 },
                CountDiscount { count: 3, percent: 30.0 },
                CountDiscount { count: 4, percent: 40.0 },
            ],
            max_individual_subjects: 4,
            mode_multipliers: ModeMultipliers {
                on_campus: 1.0,
                online: 2.0,
                home_tuition: 3.0,
            },
            sibling_discounts: vec![
                CountDiscount { count: 2, percent: 20.0 },
                CountDiscount { count: 3, percent: 30.0 },
                CountDiscount { count: 4, percent: 35.0 },
            ],
            rounding_step: 500.0,
            ac_charge_per_sibling: 2000.0,
            deserving_discount_percent: 20.0,
        }
    }
}

/// Percent of the tier with the largest `count <= n`; 0 when none applies.
pub fn tier_percent(tiers: &[CountDiscount], n: usize) -> f64 {
    tiers
        .iter()
        .filter(|t| t.count <= n)
        .max_by_key(|t| t.count)
        .map(|t| t.percent)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeAdjustments {
    #[serde(default)]
    pub ac_charges: bool,
    #[serde(default)]
    pub deserving_discount: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiblingFee {
    pub index: usize,
    pub grade: String,
    pub mode: Option<StudyMode>,
    pub subject_type: Option<SubjectType>,
    pub subjects: Vec<String>,
    pub matched: bool,
    pub base_fee: f64,
    pub priced_as_all: bool,
    pub subject_discount_percent: f64,
    pub mode_multiplier: f64,
    pub fee: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    pub siblings: Vec<SiblingFee>,
    pub raw_total: f64,
    pub sibling_discount_percent: f64,
    pub sibling_discount_amount: f64,
    pub ac_charges: f64,
    pub deserving_discount_amount: f64,
    pub total: f64,
    pub formatted_total: String,
    pub saved: f64,
}

pub fn find_structure<'a>(structures: &'a [FeeStructure], grade: &str) -> Option<&'a FeeStructure> {
    let grade = grade.trim();
    structures.iter().find(|fs| fs.grades == grade)
}

/// Fee for one sibling before household-level adjustments. An unmatched grade
/// or subject contributes 0.
pub fn sibling_fee(
    index: usize,
    detail: &SiblingDetail,
    structures: &[FeeStructure],
    rules: &FeeRules,
) -> SiblingFee {
    let mut out = SiblingFee {
        index,
        grade: detail.grade.clone(),
        mode: detail.mode,
        subject_type: detail.subject_type,
        subjects: detail.subjects.clone(),
        matched: false,
        base_fee: 0.0,
        priced_as_all: false,
        subject_discount_percent: 0.0,
        mode_multiplier: rules.mode_multipliers.for_mode(detail.mode),
        fee: 0.0,
    };
    let Some(fs) = find_structure(structures, &detail.grade) else {
        return out;
    };
    out.matched = true;

    let discounted = match detail.subject_type {
        Some(SubjectType::All) => {
            out.priced_as_all = true;
            out.base_fee = fs.all_fee();
            out.base_fee
        }
        Some(SubjectType::Selective) => {
            let mut picked = detail.distinct_subjects();
            picked.retain(|name| *name != ALL_SUBJECTS);
            if picked.len() > rules.max_individual_subjects {
                out.priced_as_all = true;
                out.base_fee = fs.all_fee();
                out.base_fee
            } else {
                out.base_fee = picked
                    .iter()
                    .filter_map(|name| fs.selectable_subject_fee(name))
                    .sum();
                out.subject_discount_percent = tier_percent(&rules.subject_discounts, picked.len());
                out.base_fee - out.base_fee * out.subject_discount_percent / 100.0
            }
        }
        None => 0.0,
    };

    // Discount first, then the delivery multiplier.
    out.fee = discounted * out.mode_multiplier;
    out
}

pub fn calculate_fee(
    details: &[SiblingDetail],
    structures: &[FeeStructure],
    rules: &FeeRules,
    adjustments: FeeAdjustments,
) -> FeeBreakdown {
    let siblings: Vec<SiblingFee> = details
        .iter()
        .enumerate()
        .map(|(i, d)| sibling_fee(i, d, structures, rules))
        .collect();
    let raw_total: f64 = siblings.iter().map(|s| s.fee).sum();

    let sibling_discount_percent = tier_percent(&rules.sibling_discounts, details.len());
    let sibling_discount_amount = raw_total * sibling_discount_percent / 100.0;
    let mut total = raw_total - sibling_discount_amount;

    let ac_charges = if adjustments.ac_charges {
        details.len() as f64 * rules.ac_charge_per_sibling
    } else {
        0.0
    };
    total += ac_charges;

    let deserving_discount_amount = if adjustments.deserving_discount {
        total * rules.deserving_discount_percent / 100.0
    } else {
        0.0
    };
    total -= deserving_discount_amount;

    let total = round_to_step(total.max(0.0), rules.rounding_step);
    let saved = round_to_step((raw_total + ac_charges - total).max(0.0), rules.rounding_step);

    FeeBreakdown {
        siblings,
        raw_total,
        sibling_discount_percent,
        sibling_discount_amount,
        ac_charges,
        deserving_discount_amount,
        total,
        formatted_total: format_amount(total),
        saved,
    }
}

/// Total household fee under the production rules with no optional
/// adjustments.
#[cfg(test)]
pub fn calculate_total_fee(details: &[SiblingDetail], structures: &[FeeStructure]) -> f64 {
    calculate_fee(details, structures, &FeeRules::default(), FeeAdjustments::default()).total
}
