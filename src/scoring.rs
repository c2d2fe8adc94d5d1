use crate::config::{ScoreBand, ScoreWeights};
use crate::data::{ScoreMetrics, StartupBrief};

/// Parse a free-form currency string such as `"$25,000"`.
///
/// Everything except ASCII digits and `.` is dropped; the longest numeric
/// prefix of what remains is parsed. Unparseable input yields 0.
pub fn parse_currency(raw: &str) -> f64 {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    // "1.2.3" parses as 1.2
    let end = match digits.find('.') {
        Some(first) => digits[first + 1..]
            .find('.')
            .map_or(digits.len(), |second| first + 1 + second),
        None => digits.len(),
    };

    digits[..end].parse::<f64>().unwrap_or(0.0)
}

fn has(text: &str) -> bool {
    !text.trim().is_empty()
}

fn flag(present: bool, weight: f64) -> f64 {
    if present {
        weight
    } else {
        0.0
    }
}

/// Round to the nearest integer, then clamp into the band.
///
/// NaN rounds to 0 before clamping. Nothing below 0 is ever returned.
fn clamp_score(raw: f64, band: ScoreBand) -> u32 {
    let clamped = (raw.round() as i64).max(band.min).min(band.max);
    u32::try_from(clamped.max(0)).unwrap_or(u32::MAX)
}

pub fn market_viability(brief: &StartupBrief, weights: &ScoreWeights) -> u32 {
    let raw = weights.market_base
        + weights.urgency.boost(brief.problem_urgency)
        + flag(has(&brief.primary_target_segment), weights.segment)
        + flag(has(&brief.market_size_estimate), weights.market_size_estimate)
        + flag(has(&brief.competitor_patterns), weights.competitor_patterns);

    clamp_score(raw, weights.market_band)
}

/// Months of runway, scaled and capped. Unknown runway earns a flat term.
fn runway_term(cash: f64, burn: f64, weights: &ScoreWeights) -> f64 {
    if cash > 0.0 && burn > 0.0 {
        (cash / burn.max(1.0) * weights.runway_multiplier).min(weights.runway_cap)
    } else {
        weights.runway_unknown
    }
}

pub fn investor_confidence(brief: &StartupBrief, weights: &ScoreWeights) -> u32 {
    let cash = parse_currency(&brief.current_cash_in_hand);
    let burn = parse_currency(&brief.monthly_burn);

    let raw = weights.investor_base
        + flag(has(&brief.elevator_pitch), weights.elevator_pitch)
        + flag(has(&brief.marketing_strategy), weights.marketing_strategy)
        + runway_term(cash, burn, weights);

    clamp_score(raw, weights.investor_band)
}

/// Cheaper acquisition earns more, down to zero.
fn cac_term(cac: f64, weights: &ScoreWeights) -> f64 {
    if cac > 0.0 {
        (weights.cac_ceiling - (cac / weights.cac_divisor).round()).max(0.0)
    } else {
        weights.cac_unknown
    }
}

pub fn customer_demand(brief: &StartupBrief, weights: &ScoreWeights) -> u32 {
    let cac = parse_currency(&brief.estimated_cac);

    let raw = weights.demand_base
        + flag(has(&brief.target_audience), weights.target_audience)
        + flag(has(&brief.customer_behavior_pain_points), weights.pain_points)
        + cac_term(cac, weights);

    clamp_score(raw, weights.demand_band)
}

/// Score a brief with the local heuristic. Pure and deterministic.
pub fn score_brief(brief: &StartupBrief, weights: &ScoreWeights) -> ScoreMetrics {
    ScoreMetrics {
        market_viability: market_viability(brief, weights),
        investor_confidence: investor_confidence(brief, weights),
        customer_demand: customer_demand(brief, weights),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Urgency;
    use rand::Rng;

    fn acme_brief() -> StartupBrief {
        StartupBrief {
            startup_name: "Acme".into(),
            problem_statement: "X".into(),
            target_audience: "Y".into(),
            primary_target_segment: "Z".into(),
            geography: "US".into(),
            monthly_burn: "$10,000".into(),
            current_cash_in_hand: "$100,000".into(),
            problem_urgency: Urgency::High,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_currency() {
        assert_eq!(parse_currency("$25,000"), 25000.0);
        assert_eq!(parse_currency(""), 0.0);
        assert_eq!(parse_currency("abc"), 0.0);
        assert_eq!(parse_currency("1.5k"), 1.5);
        assert_eq!(parse_currency("USD 1,200.50"), 1200.5);
        assert_eq!(parse_currency("."), 0.0);
        assert_eq!(parse_currency("1.2.3"), 1.2);
        assert_eq!(parse_currency("-500"), 500.0);
    }

    #[test]
    fn test_empty_brief_baselines() {
        let weights = ScoreWeights::default();
        for (urgency, boost) in [
            (Urgency::Low, 2),
            (Urgency::Medium, 5),
            (Urgency::High, 10),
            (Urgency::Critical, 13),
        ] {
            let brief = StartupBrief {
                problem_urgency: urgency,
                ..Default::default()
            };
            let metrics = score_brief(&brief, &weights);
            assert_eq!(metrics.market_viability, 48 + boost);
            assert_eq!(metrics.investor_confidence, 46);
            assert_eq!(metrics.customer_demand, 52);
        }
    }

    #[test]
    fn test_acme_scenario() {
        let metrics = score_brief(&acme_brief(), &ScoreWeights::default());

        assert_eq!(metrics.market_viability, 68);
        assert_eq!(metrics.investor_confidence, 67);
        // No CAC given: 46 + 10 + 6
        assert_eq!(metrics.customer_demand, 62);
        assert_eq!(metrics.overall(), 66);
    }

    #[test]
    fn test_whitespace_fields_do_not_count() {
        let brief = StartupBrief {
            primary_target_segment: "   ".into(),
            elevator_pitch: "\t".into(),
            target_audience: "\n".into(),
            ..Default::default()
        };
        let metrics = score_brief(&brief, &ScoreWeights::default());

        assert_eq!(metrics.market_viability, 58);
        assert_eq!(metrics.investor_confidence, 46);
        assert_eq!(metrics.customer_demand, 52);
    }

    #[test]
    fn test_fully_filled_brief_hits_upper_bands() {
        let brief = StartupBrief {
            elevator_pitch: "pitch".into(),
            marketing_strategy: "seo".into(),
            target_audience: "devs".into(),
            customer_behavior_pain_points: "slow builds".into(),
            primary_target_segment: "startups".into(),
            market_size_estimate: "$1B".into(),
            competitor_patterns: "incumbents".into(),
            problem_urgency: Urgency::Critical,
            monthly_burn: "$1".into(),
            current_cash_in_hand: "$1,000,000".into(),
            estimated_cac: "$1".into(),
            ..Default::default()
        };
        let metrics = score_brief(&brief, &ScoreWeights::default());

        // 48 + 13 + 10 + 8 + 4 = 83
        assert_eq!(metrics.market_viability, 83);
        // 42 + 8 + 6 + 25 = 81
        assert_eq!(metrics.investor_confidence, 81);
        // 46 + 10 + 10 + 16 = 82
        assert_eq!(metrics.customer_demand, 82);
    }

    #[test]
    fn test_fractional_runway_is_rounded() {
        let brief = StartupBrief {
            monthly_burn: "3".into(),
            current_cash_in_hand: "10".into(),
            ..Default::default()
        };
        // 42 + 10/3*6 = 62
        assert_eq!(investor_confidence(&brief, &ScoreWeights::default()), 62);
    }

    #[test]
    fn test_runway_needs_both_cash_and_burn() {
        let weights = ScoreWeights::default();
        let cash_only = StartupBrief {
            current_cash_in_hand: "$50,000".into(),
            ..Default::default()
        };
        assert_eq!(investor_confidence(&cash_only, &weights), 46);
    }

    #[test]
    fn test_expensive_cac_floors_at_zero() {
        let brief = StartupBrief {
            estimated_cac: "$9,999".into(),
            ..Default::default()
        };
        assert_eq!(customer_demand(&brief, &ScoreWeights::default()), 46);

        let cheap = StartupBrief {
            estimated_cac: "$400".into(),
            ..Default::default()
        };
        assert_eq!(customer_demand(&cheap, &ScoreWeights::default()), 60);
    }

    #[test]
    fn test_custom_weights_are_clamped() {
        let weights = ScoreWeights {
            market_base: 500.0,
            investor_base: -500.0,
            ..Default::default()
        };
        let metrics = score_brief(&StartupBrief::default(), &weights);
        assert_eq!(metrics.market_viability, 95);
        assert_eq!(metrics.investor_confidence, 30);
    }

    #[test]
    fn test_scores_stay_in_bands_for_random_inputs() {
        let weights = ScoreWeights::default();
        let mut rng = rand::thread_rng();
        let urgencies = [Urgency::Low, Urgency::Medium, Urgency::High, Urgency::Critical];
        let text = |rng: &mut rand::rngs::ThreadRng| {
            if rng.gen_bool(0.5) {
                "filled".to_string()
            } else {
                String::new()
            }
        };

        for _ in 0..500 {
            let brief = StartupBrief {
                problem_urgency: urgencies[rng.gen_range(0..urgencies.len())],
                elevator_pitch: text(&mut rng),
                marketing_strategy: text(&mut rng),
                target_audience: text(&mut rng),
                customer_behavior_pain_points: text(&mut rng),
                primary_target_segment: text(&mut rng),
                market_size_estimate: text(&mut rng),
                competitor_patterns: text(&mut rng),
                monthly_burn: format!("${}", rng.gen_range(0.0..1e12)),
                current_cash_in_hand: format!("${}", rng.gen_range(0.0..1e15)),
                estimated_cac: format!("{}", rng.gen_range(0u64..u64::MAX)),
                ..Default::default()
            };

            let metrics = score_brief(&brief, &weights);
            assert!((35..=95).contains(&metrics.market_viability));
            assert!((30..=94).contains(&metrics.investor_confidence));
            assert!((32..=96).contains(&metrics.customer_demand));
            assert!((30..=96).contains(&metrics.overall()));
        }
    }

    #[test]
    fn test_overflowing_currency_stays_in_bands() {
        let huge = "9".repeat(400);
        assert!(parse_currency(&huge).is_infinite());

        let weights = ScoreWeights::default();
        let briefs = [
            StartupBrief {
                monthly_burn: huge.clone(),
                current_cash_in_hand: huge.clone(),
                estimated_cac: huge.clone(),
                ..Default::default()
            },
            StartupBrief {
                monthly_burn: "$1".into(),
                current_cash_in_hand: huge.clone(),
                ..Default::default()
            },
            StartupBrief {
                monthly_burn: huge.clone(),
                current_cash_in_hand: "$1".into(),
                ..Default::default()
            },
        ];

        for brief in &briefs {
            let metrics = score_brief(brief, &weights);
            assert!((35..=95).contains(&metrics.market_viability));
            assert!((30..=94).contains(&metrics.investor_confidence));
            assert!((32..=96).contains(&metrics.customer_demand));
        }

        // inf / inf runway is NaN and earns no more than the cap
        assert!(investor_confidence(&briefs[0], &weights) <= 42 + 25);
        assert_eq!(customer_demand(&briefs[0], &weights), 46);
    }

    #[test]
    fn test_clamp_never_wraps_below_zero() {
        assert_eq!(clamp_score(-100.0, ScoreBand::new(-10, 95)), 0);
        assert_eq!(clamp_score(f64::NAN, ScoreBand::new(35, 95)), 35);
    }

    #[test]
    fn test_overall_is_rounded_mean_for_random_triples() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let metrics = ScoreMetrics {
                market_viability: rng.gen_range(35..=95),
                investor_confidence: rng.gen_range(30..=94),
                customer_demand: rng.gen_range(32..=96),
            };
            let sum = metrics.market_viability + metrics.investor_confidence + metrics.customer_demand;
            let expected = (sum as f64 / 3.0).round() as u32;

            assert_eq!(metrics.overall(), expected);
            // A mean of integers is off by at most 1/3 from its rounding
            assert!((metrics.overall() as f64 * 3.0 - sum as f64).abs() <= 1.0);
        }
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let weights = ScoreWeights::default();
        let brief = acme_brief();
        assert_eq!(score_brief(&brief, &weights), score_brief(&brief, &weights));
    }
}
