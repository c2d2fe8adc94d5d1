use serde::{Deserialize, Serialize};

use crate::data::StartupBrief;

/// Wizard steps of the brief form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BriefStep {
    Core,
    Market,
    Cost,
    Review,
}

impl BriefStep {
    pub const ALL: [BriefStep; 4] = [BriefStep::Core, BriefStep::Market, BriefStep::Cost, BriefStep::Review];

    pub fn title(&self) -> &'static str {
        match self {
            BriefStep::Core => "What are you building?",
            BriefStep::Market => "Defining your reach?",
            BriefStep::Cost => "The math of survival",
            BriefStep::Review => "Review & Launch Simulation",
        }
    }

    /// Form fields (camelCase) collected on this step
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            BriefStep::Core => &["startupName", "elevatorPitch", "problemStatement", "targetAudience"],
            BriefStep::Market => &[
                "primaryTargetSegment",
                "geography",
                "marketSizeEstimate",
                "customerBehaviorPainPoints",
            ],
            BriefStep::Cost => &["monthlyBurn", "estimatedCac", "currentCashInHand", "marketingStrategy"],
            BriefStep::Review => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

fn require(errors: &mut Vec<FieldError>, field: &'static str, value: &str, message: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError {
            field,
            message: message.to_string(),
        });
    }
}

/// Errors blocking advancement past `step`
pub fn validate_step(brief: &StartupBrief, step: BriefStep) -> Vec<FieldError> {
    let mut errors = Vec::new();

    match step {
        BriefStep::Core => {
            require(&mut errors, "startupName", &brief.startup_name, "Startup name is required.");
            require(
                &mut errors,
                "problemStatement",
                &brief.problem_statement,
                "Problem statement is required.",
            );
            require(
                &mut errors,
                "targetAudience",
                &brief.target_audience,
                "Target audience is required.",
            );
        }
        BriefStep::Market => {
            require(
                &mut errors,
                "primaryTargetSegment",
                &brief.primary_target_segment,
                "Primary target segment is required.",
            );
            require(&mut errors, "geography", &brief.geography, "Geography is required.");
            require(
                &mut errors,
                "customerBehaviorPainPoints",
                &brief.customer_behavior_pain_points,
                "Customer behavior and pain points are required.",
            );
        }
        BriefStep::Cost => {
            require(&mut errors, "monthlyBurn", &brief.monthly_burn, "Monthly burn is required.");
            require(
                &mut errors,
                "currentCashInHand",
                &brief.current_cash_in_hand,
                "Current cash in hand is required.",
            );
        }
        BriefStep::Review => {}
    }

    errors
}

/// Everything a launch needs, across all steps
pub fn validate_for_launch(brief: &StartupBrief) -> Vec<FieldError> {
    let required: [(&'static str, &str); 7] = [
        ("startupName", brief.startup_name.as_str()),
        ("problemStatement", brief.problem_statement.as_str()),
        ("targetAudience", brief.target_audience.as_str()),
        ("primaryTargetSegment", brief.primary_target_segment.as_str()),
        ("geography", brief.geography.as_str()),
        ("monthlyBurn", brief.monthly_burn.as_str()),
        ("currentCashInHand", brief.current_cash_in_hand.as_str()),
    ];

    let mut errors = Vec::new();
    for (field, value) in required {
        require(&mut errors, field, value, "Required");
    }
    errors
}

/// First step holding one of the failing fields
pub fn first_failing_step(errors: &[FieldError]) -> Option<BriefStep> {
    BriefStep::ALL
        .into_iter()
        .find(|step| errors.iter().any(|e| step.fields().contains(&e.field)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewCard {
    pub label: &'static str,
    pub value: String,
}

const NOT_PROVIDED: &str = "Not provided";

fn or_not_provided(value: &str) -> String {
    if value.trim().is_empty() {
        NOT_PROVIDED.to_string()
    } else {
        value.to_string()
    }
}

/// Summary shown before launch
pub fn review_cards(brief: &StartupBrief) -> Vec<ReviewCard> {
    let has = |s: &str| !s.trim().is_empty();

    let segment = if has(&brief.primary_target_segment) && has(&brief.geography) {
        format!("{} | {}", brief.primary_target_segment, brief.geography)
    } else {
        NOT_PROVIDED.to_string()
    };

    let cost = if has(&brief.monthly_burn) || has(&brief.current_cash_in_hand) {
        let or_zero = |s: &str| if has(s) { s.to_string() } else { "$0".to_string() };
        format!(
            "Burn {} | Cash {}",
            or_zero(&brief.monthly_burn),
            or_zero(&brief.current_cash_in_hand)
        )
    } else {
        NOT_PROVIDED.to_string()
    };

    vec![
        ReviewCard {
            label: "Core Problem",
            value: or_not_provided(&brief.problem_statement),
        },
        ReviewCard {
            label: "Market Segment",
            value: segment,
        },
        ReviewCard {
            label: "Cost Baseline",
            value: cost,
        },
        ReviewCard {
            label: "Go-to-Market",
            value: or_not_provided(&brief.marketing_strategy),
        },
    ]
}
