//! ごみカテゴリごとの廃棄方法

use serde::{Deserialize, Serialize};

/// 分類対象のごみカテゴリ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WasteCategory {
    Cardboard,
    Glass,
    Metal,
    Paper,
    Plastic,
    Trash,
}

/// 廃棄方法（捨てる箱、下準備、豆知識）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisposalGuide {
    pub bin: &'static str,
    pub preparation: &'static [&'static str],
    pub tips: &'static [&'static str],
}

const CARDBOARD: DisposalGuide = DisposalGuide {
    bin: "Blue Recycling Bin",
    preparation: &[
        "Flatten boxes to save space",
        "Remove any tape or labels",
        "Keep dry and clean",
    ],
    tips: &[
        "Cardboard is 100% recyclable",
        "Wet or greasy cardboard goes to trash",
        "Pizza boxes with grease should be composted or trashed",
    ],
};

const GLASS: DisposalGuide = DisposalGuide {
    bin: "Green Recycling Bin",
    preparation: &[
        "Rinse containers",
        "Remove lids and caps",
        "No need to remove labels",
    ],
    tips: &[
        "Glass can be recycled endlessly",
        "Broken glass should be wrapped in newspaper",
        "Window glass and mirrors are NOT recyclable with bottles",
    ],
};

const METAL: DisposalGuide = DisposalGuide {
    bin: "Blue Recycling Bin",
    preparation: &[
        "Rinse food containers",
        "Remove labels if possible",
        "Aluminum foil can be recycled if clean",
    ],
    tips: &[
        "Metal recycling saves 95% energy vs new production",
        "Steel cans are magnetic",
        "Aerosol cans should be empty",
    ],
};

const PAPER: DisposalGuide = DisposalGuide {
    bin: "Blue Recycling Bin",
    preparation: &[
        "Remove plastic windows from envelopes",
        "Keep paper dry",
        "Staples are OK to leave in",
    ],
    tips: &[
        "Shredded paper should be bagged",
        "Tissues and paper towels go to compost",
        "One ton of recycled paper saves 17 trees",
    ],
};

const PLASTIC: DisposalGuide = DisposalGuide {
    bin: "Blue Recycling Bin",
    preparation: &[
        "Check recycling number (1-7)",
        "Rinse containers thoroughly",
        "Remove caps and lids",
    ],
    tips: &[
        "#1 PET and #2 HDPE are most recyclable",
        "Plastic bags go to special collection points",
        "Only 9% of plastic ever made has been recycled",
    ],
};

const TRASH: DisposalGuide = DisposalGuide {
    bin: "Black/Gray Trash Bin",
    preparation: &[
        "Bag securely",
        "Consider if any parts are recyclable",
        "Dispose of hazardous waste separately",
    ],
    tips: &[
        "Look for recycling opportunities first",
        "Donate items in good condition",
        "Reduce, reuse, then recycle",
    ],
};

impl WasteCategory {
    pub const ALL: [WasteCategory; 6] = [
        WasteCategory::Cardboard,
        WasteCategory::Glass,
        WasteCategory::Metal,
        WasteCategory::Paper,
        WasteCategory::Plastic,
        WasteCategory::Trash,
    ];

    /// クラスラベルからカテゴリを取得
    ///
    /// ラベルは学習時の表記（小文字）と完全一致する必要があります。
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "cardboard" => Some(WasteCategory::Cardboard),
            "glass" => Some(WasteCategory::Glass),
            "metal" => Some(WasteCategory::Metal),
            "paper" => Some(WasteCategory::Paper),
            "plastic" => Some(WasteCategory::Plastic),
            "trash" => Some(WasteCategory::Trash),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WasteCategory::Cardboard => "cardboard",
            WasteCategory::Glass => "glass",
            WasteCategory::Metal => "metal",
            WasteCategory::Paper => "paper",
            WasteCategory::Plastic => "plastic",
            WasteCategory::Trash => "trash",
        }
    }

    /// カテゴリの廃棄方法
    pub fn disposal(&self) -> &'static DisposalGuide {
        match self {
            WasteCategory::Cardboard => &CARDBOARD,
            WasteCategory::Glass => &GLASS,
            WasteCategory::Metal => &METAL,
            WasteCategory::Paper => &PAPER,
            WasteCategory::Plastic => &PLASTIC,
            WasteCategory::Trash => &TRASH,
        }
    }
}

impl std::fmt::Display for WasteCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// ラベルから廃棄方法を引く。未知のラベルは `None`
pub fn disposal_for_label(label: &str) -> Option<&'static DisposalGuide> {
    WasteCategory::from_label(label).map(|category| category.disposal())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_category_has_guide() {
        for category in WasteCategory::ALL {
            let guide = category.disposal();
            assert!(!guide.bin.is_empty());
            assert_eq!(guide.preparation.len(), 3);
            assert_eq!(guide.tips.len(), 3);
        }
    }

    #[test]
    fn test_label_round_trip() {
        for category in WasteCategory::ALL {
            assert_eq!(WasteCategory::from_label(category.label()), Some(category));
            assert_eq!(category.to_string(), category.label());
        }
    }

    #[test]
    fn test_unknown_label() {
        assert!(disposal_for_label("battery").is_none());
        // 大文字小文字は区別する
        assert!(disposal_for_label("Cardboard").is_none());
    }

    #[test]
    fn test_cardboard_goes_to_blue_bin() {
        let guide = disposal_for_label("cardboard").unwrap();
        assert_eq!(guide.bin, "Blue Recycling Bin");
        assert_eq!(guide.preparation[0], "Flatten boxes to save space");
        assert_eq!(disposal_for_label("trash").unwrap().bin, "Black/Gray Trash Bin");
    }
}
