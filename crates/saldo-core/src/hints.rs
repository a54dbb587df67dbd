//! Keyword category hints
//!
//! A cheap zero-training baseline applied at ingest time: keyword-anchored
//! mappings from statement text to category ids. Entries are
//! direction-sensitive where the same merchant line means different things
//! for money out and money in (a Trumf line is a grocery purchase when
//! negative but a bonus payout when positive). Returns None rather than
//! guessing.

use crate::categories;

/// One keyword-anchored mapping; either side may be absent
struct HintRule {
    keywords: &'static [&'static str],
    expense: Option<&'static str>,
    income: Option<&'static str>,
}

const fn both(keywords: &'static [&'static str], id: &'static str) -> HintRule {
    HintRule {
        keywords,
        expense: Some(id),
        income: Some(id),
    }
}

const fn split(
    keywords: &'static [&'static str],
    expense: Option<&'static str>,
    income: Option<&'static str>,
) -> HintRule {
    HintRule {
        keywords,
        expense,
        income,
    }
}

/// Hint table in precedence order; more specific entries come first
static HINTS: &[HintRule] = &[
    // direction-sensitive entries
    split(
        &["trumf", "coop medlem"],
        Some(categories::GROCERIES),
        Some(categories::INCOME_REFUND),
    ),
    split(
        &["skatteetaten", "kemner", "restskatt", "forskuddsskatt"],
        Some(categories::TAXES),
        Some(categories::INCOME_REFUND),
    ),
    split(
        &["renter", "rentekostnad"],
        Some(categories::FEES),
        Some(categories::INCOME),
    ),
    split(&["lønn", "feriepenger"], None, Some(categories::INCOME_SALARY)),
    split(&["nav ", "pensjon"], None, Some(categories::INCOME)),
    split(
        &["refusjon", "tilbakebetaling"],
        None,
        Some(categories::INCOME_REFUND),
    ),
    // peer-to-peer transfer apps keep their id in both directions
    both(&["vipps", "mobilepay"], categories::TRANSFERS_P2P),
    // streaming before the generic subscription entries
    both(
        &[
            "netflix", "spotify", "hbo", "viaplay", "disney", "tv 2 play", "youtube premium",
        ],
        categories::SUBSCRIPTIONS_STREAMING,
    ),
    both(
        &["adobe", "icloud", "google one", "microsoft 365", "dropbox"],
        categories::SUBSCRIPTIONS,
    ),
    both(
        &[
            "kiwi", "rema", "coop", "joker", "meny", "bunnpris", "matkroken", "oda.no",
        ],
        categories::GROCERIES,
    ),
    both(&["vinmonopolet"], categories::ALCOHOL),
    both(
        &["circle k", "shell", "esso", "uno-x", "st1", "bensin", "drivstoff"],
        categories::TRANSPORT_FUEL,
    ),
    both(
        &["easypark", "apcoa", "onepark", "parkering"],
        categories::TRANSPORT_PARKING,
    ),
    both(
        &["fjellinjen", "autopass", "bompenger", "bomring"],
        categories::TRANSPORT_TOLL,
    ),
    both(
        &["ruter", "flytoget", "atb ", "skyss", "kolumbus", "taxi", "bysykkel"],
        categories::TRANSPORT,
    ),
    both(
        &["telenor", "telia", "fjordkraft", "tibber", "hafslund", "nettleie", "strøm"],
        categories::UTILITIES,
    ),
    both(&["husleie", "obos", "boligbyggelag"], categories::HOUSING_RENT),
    both(&["kommunale avgifter", "felleskostnader"], categories::HOUSING),
    both(
        &["gjensidige", "tryg", "fremtind", "if skadeforsikring", "forsikring"],
        categories::INSURANCE,
    ),
    both(
        &["apotek", "vitusapotek", "boots", "legesenter", "tannlege", "legevakt"],
        categories::HEALTH,
    ),
    both(
        &["sats", "elixia", "fresh fitness", "treningssenter"],
        categories::FITNESS,
    ),
    both(
        &[
            "mcdonald",
            "burger king",
            "peppes",
            "pizzabakeren",
            "sushi",
            "kebab",
            "kafe",
            "kaffebrenneriet",
            "espresso house",
            "starbucks",
            "foodora",
            "wolt",
            "restaurant",
        ],
        categories::DINING,
    ),
    both(
        &["h&m", "zara", "cubus", "dressmann", "zalando", "lindex"],
        categories::SHOPPING_CLOTHING,
    ),
    both(
        &["elkjøp", "komplett", "kjell & company"],
        categories::SHOPPING_ELECTRONICS,
    ),
    both(
        &["ikea", "jysk", "biltema", "europris", "nille", "jernia", "clas ohlson"],
        categories::SHOPPING,
    ),
    both(
        &["kino", "steam", "playstation", "nintendo", "billetter"],
        categories::ENTERTAINMENT,
    ),
    both(
        &[
            "norwegian air",
            "widerøe",
            "hurtigruten",
            "airbnb",
            "booking.com",
            "hotels.com",
        ],
        categories::TRAVEL,
    ),
    both(
        &["røde kors", "unicef", "kirkens nødhjelp", "leger uten grenser"],
        categories::CHARITY,
    ),
    both(
        &["gebyr", "termingebyr", "årsavgift", "purregebyr"],
        categories::FEES,
    ),
];

/// Keyword category hints with an immutable table owned by the engine
pub struct CategoryHints {
    rules: &'static [HintRule],
}

impl CategoryHints {
    pub fn new() -> Self {
        Self { rules: HINTS }
    }

    /// Map statement text and a signed amount to a category id, or None when
    /// nothing matches
    pub fn hint(&self, text: &str, amount: f64) -> Option<&'static str> {
        let lower = text.to_lowercase();
        for rule in self.rules {
            if !rule.keywords.iter().any(|k| lower.contains(k)) {
                continue;
            }
            let side = if amount > 0.0 {
                rule.income
            } else {
                rule.expense
            };
            if side.is_some() {
                return side;
            }
        }
        None
    }
}

impl Default for CategoryHints {
    fn default() -> Self {
        Self::new()
    }
}
