//! リサイクルに関する豆知識

use rand::seq::SliceRandom;

/// 豆知識の一覧
pub const EDUCATIONAL_FACTS: [&str; 15] = [
    "♻️ Recycling one aluminum can saves enough energy to power a TV for 3 hours!",
    "🌍 Americans throw away 25 trillion Styrofoam cups every year.",
    "📄 Recycling one ton of paper can save 17 trees, 7,000 gallons of water, and 463 gallons of oil.",
    "🥤 A plastic bottle can take up to 450 years to decompose in a landfill.",
    "♻️ Glass is 100% recyclable and can be recycled endlessly without loss of quality.",
    "🌱 Composting food waste can reduce your household waste by up to 30%.",
    "🔋 E-waste contains valuable materials like gold, silver, and copper that can be recovered.",
    "🌊 8 million tons of plastic enter our oceans every year - that's one garbage truck per minute.",
    "♻️ Recycling steel saves 60% of the energy needed to make it from raw materials.",
    "🌍 If everyone in the US recycled their newspaper, we could save 250 million trees annually.",
    "🥫 Aluminum can be recycled and back on the shelf as a new can in just 60 days.",
    "💡 LED bulbs use 75% less energy and last 25 times longer than incandescent bulbs.",
    "🌱 Americans generate 254 million tons of trash per year.",
    "♻️ Recycling creates 6 times more jobs than landfilling waste.",
    "🌍 The average person generates 4.5 pounds of trash per day in the United States.",
];

/// 豆知識の供給元
///
/// 推論結果ごとに1つ選ばれます。テストでは固定値を返す実装に差し替えます。
pub trait FactSource: Send + Sync {
    fn pick(&self) -> String;
}

/// 一覧から一様ランダムに選ぶ（シードなし）
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomFactSource;

impl FactSource for RandomFactSource {
    fn pick(&self) -> String {
        EDUCATIONAL_FACTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(EDUCATIONAL_FACTS[0])
            .to_string()
    }
}

/// 常に同じ文を返す
#[derive(Debug, Clone)]
pub struct FixedFactSource(pub String);

impl FactSource for FixedFactSource {
    fn pick(&self) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_fact_is_from_set() {
        let source = RandomFactSource;
        for _ in 0..50 {
            let fact = source.pick();
            assert!(!fact.is_empty());
            assert!(EDUCATIONAL_FACTS.contains(&fact.as_str()));
        }
    }

    #[test]
    fn test_fixed_fact() {
        let source = FixedFactSource("fact".to_string());
        assert_eq!(source.pick(), "fact");
        assert_eq!(source.pick(), "fact");
    }
}
