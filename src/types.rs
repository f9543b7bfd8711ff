use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::guidance::DisposalGuide;

/// 1回の推論結果
///
/// フィールド名はHTTPレスポンスの契約の一部なので変更しないこと。
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    pub predicted_class: String,
    /// 0〜100、小数第2位で丸め
    pub confidence: f64,
    pub all_predictions: ClassScores,
    pub is_uncertain: bool,
    pub disposal_instructions: DisposalInstructions,
    pub educational_fact: String,
}

/// クラスごとのスコア（百分率）
///
/// ラベル順を保ったままJSONオブジェクトとして出力します。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassScores(pub Vec<(String, f64)>);

impl ClassScores {
    pub fn get(&self, label: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, score)| *score)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.0.iter().map(|(_, score)| score).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, score)| (name.as_str(), *score))
    }
}

impl Serialize for ClassScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, score) in &self.0 {
            map.serialize_entry(label, score)?;
        }
        map.end()
    }
}

/// 廃棄方法。未知のクラスは空オブジェクト `{}` として出力
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DisposalInstructions(pub Option<&'static DisposalGuide>);

impl DisposalInstructions {
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn bin(&self) -> Option<&'static str> {
        self.0.map(|guide| guide.bin)
    }
}

impl Serialize for DisposalInstructions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Some(guide) => {
                let mut state = serializer.serialize_struct("DisposalInstructions", 3)?;
                state.serialize_field("bin", guide.bin)?;
                state.serialize_field("preparation", guide.preparation)?;
                state.serialize_field("tips", guide.tips)?;
                state.end()
            }
            None => serializer.serialize_map(Some(0))?.end(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guidance::disposal_for_label;

    #[test]
    fn test_scores_keep_label_order() {
        let scores = ClassScores(vec![
            ("paper".to_string(), 10.0),
            ("cardboard".to_string(), 90.0),
        ]);
        let json = serde_json::to_string(&scores).unwrap();
        assert_eq!(json, r#"{"paper":10.0,"cardboard":90.0}"#);
        assert_eq!(scores.get("cardboard"), Some(90.0));
        assert_eq!(scores.get("glass"), None);
    }

    #[test]
    fn test_empty_disposal_serializes_as_empty_object() {
        let json = serde_json::to_value(DisposalInstructions(None)).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }

    #[test]
    fn test_disposal_fields() {
        let instructions = DisposalInstructions(disposal_for_label("glass"));
        let json = serde_json::to_value(instructions).unwrap();
        assert_eq!(json["bin"], "Green Recycling Bin");
        assert_eq!(json["preparation"].as_array().unwrap().len(), 3);
        assert_eq!(json["tips"][0], "Glass can be recycled endlessly");
    }
}
