// src/weight.rs
// 重量单位与汇总：输入清单的分类/装备树，输出每个分类和整张清单的汇总。
// 一律先按克累加，最后再换算成请求的显示单位

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Category, Item, ItemLabel};

const GRAMS_PER_OUNCE: f64 = 28.3495;
const GRAMS_PER_KILOGRAM: f64 = 1000.0;
const GRAMS_PER_POUND: f64 = 453.592;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    #[default]
    G,
    Oz,
    Kg,
    Lbs,
}

impl WeightUnit {
    pub const ALL: [WeightUnit; 4] =
        [WeightUnit::G, WeightUnit::Oz, WeightUnit::Kg, WeightUnit::Lbs];

    pub fn grams_per_unit(self) -> f64 {
        match self {
            WeightUnit::G => 1.0,
            WeightUnit::Oz => GRAMS_PER_OUNCE,
            WeightUnit::Kg => GRAMS_PER_KILOGRAM,
            WeightUnit::Lbs => GRAMS_PER_POUND,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WeightUnit::G => "g",
            WeightUnit::Oz => "oz",
            WeightUnit::Kg => "kg",
            WeightUnit::Lbs => "lbs",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "g" => Some(WeightUnit::G),
            "oz" => Some(WeightUnit::Oz),
            "kg" => Some(WeightUnit::Kg),
            "lbs" => Some(WeightUnit::Lbs),
            _ => None,
        }
    }

    /// Unknown unit strings are read as grams rather than rejected.
    /// Request bodies never get here: they deserialize into the enum
    /// and an unknown unit is a 400.
    pub fn parse_or_grams(s: &str) -> Self {
        Self::parse(s).unwrap_or_else(|| {
            tracing::debug!("unknown weight unit {:?}, treating as grams", s);
            WeightUnit::G
        })
    }
}

pub fn to_grams(amount: f64, unit: WeightUnit) -> f64 {
    amount * unit.grams_per_unit()
}

pub fn from_grams(grams: f64, unit: WeightUnit) -> f64 {
    grams / unit.grams_per_unit()
}

/// Always routed through grams, never a direct cross table.
pub fn convert(amount: f64, from: WeightUnit, to: WeightUnit) -> f64 {
    from_grams(to_grams(amount, from), to)
}

/// Base / worn / consumable split of some weight, in a single unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightBreakdown {
    pub base: f64,
    pub worn: f64,
    pub consumable: f64,
}

impl WeightBreakdown {
    pub fn total(&self) -> f64 {
        self.base + self.worn + self.consumable
    }

    fn add(&mut self, other: WeightBreakdown) {
        self.base += other.base;
        self.worn += other.worn;
        self.consumable += other.consumable;
    }

    fn in_unit(self, unit: WeightUnit) -> Self {
        WeightBreakdown {
            base: from_grams(self.base, unit),
            worn: from_grams(self.worn, unit),
            consumable: from_grams(self.consumable, unit),
        }
    }
}

/// Splits `amount × quantity` (in grams) into buckets by label.
///
/// A worn item puts exactly one unit on the body; spares go in the pack
/// and count as base weight.
pub fn item_breakdown(
    amount: f64,
    unit: WeightUnit,
    label: ItemLabel,
    quantity: i32,
) -> WeightBreakdown {
    if quantity <= 0 {
        return WeightBreakdown::default();
    }
    let each = to_grams(amount, unit);
    let total = each * f64::from(quantity);

    match label {
        ItemLabel::None => WeightBreakdown { base: total, ..Default::default() },
        ItemLabel::Consumable => WeightBreakdown { consumable: total, ..Default::default() },
        ItemLabel::Worn => WeightBreakdown {
            base: each * f64::from(quantity - 1),
            worn: each,
            consumable: 0.0,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub category_id: Uuid,
    pub base_weight: f64,
    pub worn_weight: f64,
    pub consumable_weight: f64,
    pub total_weight: f64,
    pub item_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSummary {
    pub unit: WeightUnit,
    pub categories: Vec<CategorySummary>,
    pub total_base_weight: f64,
    pub total_worn_weight: f64,
    pub total_consumable_weight: f64,
    pub total_pack_weight: f64,
    pub total_item_count: usize,
    pub formatted: FormattedTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedTotals {
    pub base: String,
    pub worn: String,
    pub consumable: String,
    pub total: String,
}

fn category_grams(items: &[Item]) -> WeightBreakdown {
    let mut sum = WeightBreakdown::default();
    for item in items {
        sum.add(item_breakdown(item.weight_amount, item.weight_unit, item.label, item.quantity));
    }
    sum
}

pub fn summarize_category(
    category_id: Uuid,
    items: &[Item],
    unit: WeightUnit,
) -> CategorySummary {
    let weights = category_grams(items).in_unit(unit);
    CategorySummary {
        category_id,
        base_weight: weights.base,
        worn_weight: weights.worn,
        consumable_weight: weights.consumable,
        total_weight: weights.total(),
        item_count: items.len(),
    }
}

/// Aggregates a list tree. Categories are taken in the given order.
pub fn summarize_list(tree: &[(Category, Vec<Item>)], unit: WeightUnit) -> ListSummary {
    let categories: Vec<CategorySummary> = tree
        .iter()
        .map(|(category, items)| summarize_category(category.id, items, unit))
        .collect();

    let mut totals = WeightBreakdown::default();
    let mut total_item_count = 0;
    for c in &categories {
        totals.add(WeightBreakdown {
            base: c.base_weight,
            worn: c.worn_weight,
            consumable: c.consumable_weight,
        });
        total_item_count += c.item_count;
    }
    let total_pack_weight = totals.total();

    ListSummary {
        unit,
        formatted: FormattedTotals {
            base: format_weight(totals.base, unit),
            worn: format_weight(totals.worn, unit),
            consumable: format_weight(totals.consumable, unit),
            total: format_weight(total_pack_weight, unit),
        },
        categories,
        total_base_weight: totals.base,
        total_worn_weight: totals.worn,
        total_consumable_weight: totals.consumable,
        total_pack_weight,
        total_item_count,
    }
}

/// Display precision shrinks as the value grows: 2 decimals under 0.1,
/// 1 decimal under 10, whole numbers above.
pub fn format_weight(value: f64, unit: WeightUnit) -> String {
    let number = if value < 0.1 {
        format!("{:.2}", value)
    } else if value < 10.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value.round() as i64)
    };
    format!("{} {}", number, unit.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(amount: f64, unit: WeightUnit, label: ItemLabel, quantity: i32) -> Item {
        let now = Utc::now();
        Item {
            id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            name: "thing".into(),
            description: None,
            url: None,
            weight_amount: amount,
            weight_unit: unit,
            label,
            quantity,
            position: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn category(position: i32) -> Category {
        let now = Utc::now();
        Category {
            id: Uuid::new_v4(),
            list_id: Uuid::new_v4(),
            name: format!("cat {position}"),
            description: None,
            position,
            created_at: now,
            updated_at: now,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn conversion_round_trips_for_every_unit_pair() {
        for from in WeightUnit::ALL {
            for to in WeightUnit::ALL {
                for x in [0.0, 0.05, 1.0, 12.5, 987.654] {
                    let back = convert(convert(x, from, to), to, from);
                    assert!(close(back, x), "{x} {from:?}->{to:?} came back as {back}");
                }
            }
        }
    }

    #[test]
    fn known_factors() {
        assert!(close(convert(1.0, WeightUnit::Kg, WeightUnit::G), 1000.0));
        assert!(close(convert(1.0, WeightUnit::Oz, WeightUnit::G), 28.3495));
        assert!(close(convert(1.0, WeightUnit::Lbs, WeightUnit::G), 453.592));
        assert!(close(convert(16.0, WeightUnit::Oz, WeightUnit::Lbs), 16.0 * 28.3495 / 453.592));
    }

    #[test]
    fn unknown_unit_string_falls_back_to_grams() {
        assert_eq!(WeightUnit::parse_or_grams("stone"), WeightUnit::G);
        assert_eq!(WeightUnit::parse_or_grams(""), WeightUnit::G);
        assert_eq!(WeightUnit::parse_or_grams("lbs"), WeightUnit::Lbs);
        assert_eq!(WeightUnit::parse("stone"), None);
    }

    #[test]
    fn worn_item_keeps_one_unit_on_the_body() {
        let single = item_breakdown(300.0, WeightUnit::G, ItemLabel::Worn, 1);
        assert_eq!(single, WeightBreakdown { base: 0.0, worn: 300.0, consumable: 0.0 });

        let three = item_breakdown(300.0, WeightUnit::G, ItemLabel::Worn, 3);
        assert_eq!(three, WeightBreakdown { base: 600.0, worn: 300.0, consumable: 0.0 });
    }

    #[test]
    fn unlabelled_and_consumable_items_take_the_full_total() {
        let base = item_breakdown(2.0, WeightUnit::Kg, ItemLabel::None, 2);
        assert_eq!(base, WeightBreakdown { base: 4000.0, worn: 0.0, consumable: 0.0 });

        let food = item_breakdown(100.0, WeightUnit::G, ItemLabel::Consumable, 5);
        assert_eq!(food, WeightBreakdown { base: 0.0, worn: 0.0, consumable: 500.0 });
    }

    #[test]
    fn non_positive_quantity_weighs_nothing() {
        assert_eq!(
            item_breakdown(300.0, WeightUnit::G, ItemLabel::Worn, 0),
            WeightBreakdown::default()
        );
    }

    #[test]
    fn list_totals_are_additive() {
        let tree = vec![
            (
                category(0),
                vec![
                    item(1.2, WeightUnit::Kg, ItemLabel::None, 1),
                    item(4.0, WeightUnit::Oz, ItemLabel::Worn, 2),
                ],
            ),
            (
                category(1),
                vec![
                    item(0.5, WeightUnit::Lbs, ItemLabel::Consumable, 3),
                    item(80.0, WeightUnit::G, ItemLabel::Worn, 1),
                    item(12.0, WeightUnit::G, ItemLabel::None, 4),
                ],
            ),
            (category(2), vec![]),
        ];

        let summary = summarize_list(&tree, WeightUnit::Oz);
        let bucket_sum =
            summary.total_base_weight + summary.total_worn_weight + summary.total_consumable_weight;
        assert!(close(bucket_sum, summary.total_pack_weight));

        let base: f64 = summary.categories.iter().map(|c| c.base_weight).sum();
        let worn: f64 = summary.categories.iter().map(|c| c.worn_weight).sum();
        let consumable: f64 = summary.categories.iter().map(|c| c.consumable_weight).sum();
        assert!(close(base, summary.total_base_weight));
        assert!(close(worn, summary.total_worn_weight));
        assert!(close(consumable, summary.total_consumable_weight));

        for c in &summary.categories {
            assert!(close(c.base_weight + c.worn_weight + c.consumable_weight, c.total_weight));
        }
        assert_eq!(summary.total_item_count, 5);
        assert_eq!(summary.categories[2].item_count, 0);
        assert_eq!(summary.categories[2].total_weight, 0.0);
    }

    #[test]
    fn item_count_ignores_quantity() {
        let tree = vec![(category(0), vec![item(10.0, WeightUnit::G, ItemLabel::None, 7)])];
        let summary = summarize_list(&tree, WeightUnit::G);
        assert_eq!(summary.categories[0].item_count, 1);
        assert_eq!(summary.total_item_count, 1);
        assert!(close(summary.total_pack_weight, 70.0));
    }

    #[test]
    fn summary_is_expressed_in_requested_unit() {
        let tree = vec![(category(0), vec![item(2500.0, WeightUnit::G, ItemLabel::None, 1)])];
        let summary = summarize_list(&tree, WeightUnit::Kg);
        assert!(close(summary.total_pack_weight, 2.5));
        assert_eq!(summary.formatted.total, "2.5 kg");
        assert_eq!(summary.formatted.worn, "0.00 kg");
    }

    #[test]
    fn formatting_precision_depends_on_magnitude() {
        assert_eq!(format_weight(0.0456, WeightUnit::Kg), "0.05 kg");
        assert_eq!(format_weight(0.27, WeightUnit::Lbs), "0.3 lbs");
        assert_eq!(format_weight(9.94, WeightUnit::Oz), "9.9 oz");
        assert_eq!(format_weight(10.0, WeightUnit::G), "10 g");
        assert_eq!(format_weight(1234.6, WeightUnit::G), "1235 g");
    }
}
