//! Display names for generated races.

use rand::Rng;
use rand::seq::SliceRandom;

const ADJECTIVES: &[&str] = &[
    "Lightning", "Golden", "Midnight", "Diamond", "Thunder", "Silver", "Crimson", "Sapphire",
    "Emerald", "Phoenix", "Storm", "Royal", "Blazing", "Mystic", "Stellar", "Titan", "Arctic",
    "Neon",
];

const RACE_TYPES: &[&str] = &[
    "Championship Stakes", "Derby Classic", "Sprint Cup", "Grand Prix", "Elite Trophy",
    "Masters Cup", "Victory Stakes", "Premier Classic", "Royal Challenge", "Champions League",
    "Speed Trial", "Glory Run",
];

const TRACKS: &[&str] = &[
    "Thunder Valley", "Sunset Meadows", "Golden Gate", "Silver Stream", "Lightning Ridge",
    "Moonlight Bay", "Crystal Falls", "Storm Peak", "Eagle Heights", "Diamond Downs",
    "Phoenix Park", "Emerald Fields",
];

/// `"<Adjective> <RaceType> at <Track>"`, e.g. "Neon Sprint Cup at Storm Peak".
pub fn generate_race_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let pick = |words: &[&'static str], rng: &mut R| words.choose(rng).copied().unwrap_or_default();

    let adjective = pick(ADJECTIVES, rng);
    let race_type = pick(RACE_TYPES, rng);
    let track = pick(TRACKS, rng);
    format!("{adjective} {race_type} at {track}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_name_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let name = generate_race_name(&mut rng);
            let (head, track) = name.split_once(" at ").unwrap();
            assert!(TRACKS.contains(&track));
            assert!(ADJECTIVES.iter().any(|a| head.starts_with(a)));
            assert!(RACE_TYPES.iter().any(|t| head.ends_with(t)));
        }
    }
}
