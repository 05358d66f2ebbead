use image::Rgb;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreatTier {
    Critical,
    Elevated,
    Caution,
    Normal,
}

impl ThreatTier {
    pub fn color(self) -> Rgb<u8> {
        match self {
            ThreatTier::Critical => Rgb([255, 0, 0]),
            ThreatTier::Elevated => Rgb([255, 165, 0]),
            ThreatTier::Caution => Rgb([255, 255, 0]),
            ThreatTier::Normal => Rgb([0, 255, 0]),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThreatTier::Critical => "critical",
            ThreatTier::Elevated => "elevated",
            ThreatTier::Caution => "caution",
            ThreatTier::Normal => "normal",
        }
    }
}

const VEHICLES: [&str; 4] = ["car", "truck", "motorcycle", "bicycle"];

type Rule = (fn(&str, f32) -> bool, ThreatTier);

/// Evaluated top to bottom; first match wins, no match is `Normal`.
const RULES: [Rule; 3] = [
    (person_above_80, ThreatTier::Critical),
    (person_above_65, ThreatTier::Elevated),
    (vehicle, ThreatTier::Caution),
];

fn person_above_80(class: &str, conf: f32) -> bool {
    class == "person" && conf > 0.80
}

fn person_above_65(class: &str, conf: f32) -> bool {
    class == "person" && conf > 0.65
}

fn vehicle(class: &str, _conf: f32) -> bool {
    VEHICLES.contains(&class)
}

/// Classify one detection on its own; neighbours never influence the tier.
pub fn classify(class_name: &str, confidence: f32) -> ThreatTier {
    RULES
        .iter()
        .find(|(pred, _)| pred(class_name, confidence))
        .map(|&(_, tier)| tier)
        .unwrap_or(ThreatTier::Normal)
}

pub fn threat_color(class_name: &str, confidence: f32) -> Rgb<u8> {
    classify(class_name, confidence).color()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn person_tiers_follow_thresholds() {
        let cases = [
            (1.0, ThreatTier::Critical),
            (0.92, ThreatTier::Critical),
            (0.8001, ThreatTier::Critical),
            (0.80, ThreatTier::Elevated),
            (0.70, ThreatTier::Elevated),
            (0.6501, ThreatTier::Elevated),
            (0.65, ThreatTier::Normal),
            (0.3, ThreatTier::Normal),
            (0.0, ThreatTier::Normal),
        ];
        for (conf, tier) in cases {
            assert_eq!(classify("person", conf), tier, "conf {}", conf);
        }
    }

    #[test]
    fn person_sweep_matches_bands() {
        for i in 0..=1000 {
            let c = i as f32 / 1000.0;
            let tier = classify("person", c);
            let expected = if c > 0.80 {
                ThreatTier::Critical
            } else if c > 0.65 {
                ThreatTier::Elevated
            } else {
                ThreatTier::Normal
            };
            assert_eq!(tier, expected, "conf {}", c);
        }
    }

    #[test]
    fn vehicles_are_caution_at_any_confidence() {
        for class in VEHICLES {
            for conf in [0.0, 0.4, 0.66, 0.81, 1.0] {
                assert_eq!(classify(class, conf), ThreatTier::Caution, "{} {}", class, conf);
            }
        }
    }

    #[test]
    fn everything_else_is_normal() {
        for class in ["dog", "bus", "Person", "", "traffic light"] {
            for conf in [0.0, 0.9, 1.0, f32::NAN] {
                assert_eq!(classify(class, conf), ThreatTier::Normal);
            }
        }
        assert_eq!(classify("person", f32::NAN), ThreatTier::Normal);
    }

    #[test]
    fn colors_are_distinct() {
        assert_eq!(threat_color("person", 0.92), Rgb([255, 0, 0]));
        assert_eq!(threat_color("person", 0.7), Rgb([255, 165, 0]));
        assert_eq!(threat_color("car", 0.4), Rgb([255, 255, 0]));
        assert_eq!(threat_color("dog", 0.99), Rgb([0, 255, 0]));
    }

    #[test]
    fn tier_names_are_lowercase() {
        assert_eq!(classify("person", 0.92).as_str(), "critical");
        assert_eq!(classify("person", 0.7).as_str(), "elevated");
        assert_eq!(classify("truck", 0.1).as_str(), "caution");
        assert_eq!(classify("dog", 0.9).as_str(), "normal");
    }
}
