//! Well-known category identifiers
//!
//! Categories are identified by stable dotted-path ids ("transport.fuel" is
//! a child of "transport"). The caller's category store owns the full tree;
//! the ids listed here are the ones the hint engine and the reclassifier
//! guardrails need to know about.

pub const GROCERIES: &str = "groceries";
pub const ALCOHOL: &str = "alcohol";
pub const DINING: &str = "dining";
pub const TRANSPORT: &str = "transport";
pub const TRANSPORT_FUEL: &str = "transport.fuel";
pub const TRANSPORT_PARKING: &str = "transport.parking";
pub const TRANSPORT_TOLL: &str = "transport.toll";
pub const SUBSCRIPTIONS: &str = "subscriptions";
pub const SUBSCRIPTIONS_STREAMING: &str = "subscriptions.streaming";
pub const UTILITIES: &str = "utilities";
pub const HOUSING: &str = "housing";
pub const HOUSING_RENT: &str = "housing.rent";
pub const INSURANCE: &str = "insurance";
pub const HEALTH: &str = "health";
pub const FITNESS: &str = "personal.fitness";
pub const SHOPPING: &str = "shopping";
pub const SHOPPING_CLOTHING: &str = "shopping.clothing";
pub const SHOPPING_ELECTRONICS: &str = "shopping.electronics";
pub const ENTERTAINMENT: &str = "entertainment";
pub const TRAVEL: &str = "travel";
pub const CHARITY: &str = "charity";
pub const FEES: &str = "fees";
pub const TAXES: &str = "taxes";
pub const TRANSFERS_P2P: &str = "transfers.p2p";
pub const INCOME: &str = "income";
pub const INCOME_SALARY: &str = "income.salary";
pub const INCOME_REFUND: &str = "income.refund";

/// The catch-all bucket for transactions nothing classified
pub const OTHER: &str = "other";

/// Leaf categories safe to keep at full specificity in force mode
///
/// Everything else is collapsed to its top-level ancestor before a forced
/// commit.
pub const SAFE_FORCE_LEAVES: &[&str] = &[
    SUBSCRIPTIONS_STREAMING,
    TRANSPORT_FUEL,
    HOUSING_RENT,
    INCOME_SALARY,
];

/// True for ids in the income subtree
pub fn is_income(category_id: &str) -> bool {
    category_id == INCOME || category_id.starts_with("income.")
}
