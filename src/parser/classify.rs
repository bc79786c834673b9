//! Keyword tables for post filtering, store detection and categorisation.
//!
//! All tables are ordered and evaluated first-match-wins.

use crate::constants::FALLBACK_CATEGORY;

/// Title markers for posts that ask for deals rather than share one.
pub const SKIP_MARKERS: &[&str] = &[
    "[meta]",
    "[question]",
    "[discussion]",
    "looking for",
    "suggest me",
    "help needed",
    "which one",
];

/// Store name and the URL fragments that identify it.
pub const STORE_PATTERNS: &[(&str, &[&str])] = &[
    ("Amazon", &["amazon.in", "amzn.to", "amazon.com", "amzn.in"]),
    ("Flipkart", &["flipkart.com", "fkrt.it"]),
    ("Myntra", &["myntra.com"]),
    ("Ajio", &["ajio.com"]),
    ("Nykaa", &["nykaa.com"]),
    ("Croma", &["croma.com"]),
    ("Reliance", &["reliancedigital.in", "jiomart.com"]),
    ("Tata", &["tatacliq.com", "bigbasket.com"]),
    ("Paytm", &["paytmmall.com"]),
    ("Shopclues", &["shopclues.com"]),
    ("Snapdeal", &["snapdeal.com"]),
    ("Meesho", &["meesho.com"]),
    ("Blinkit", &["blinkit.com"]),
    ("Zepto", &["zepto.co"]),
    ("Swiggy", &["swiggy.com", "instamart"]),
    ("Best Buy", &["bestbuy.com", "bestbuy.ca"]),
    ("Walmart", &["walmart.com", "walmart.ca"]),
    ("Newegg", &["newegg.com", "newegg.ca"]),
    ("eBay", &["ebay.com", "ebay.co.uk", "ebay.ca"]),
    ("AliExpress", &["aliexpress.com"]),
    ("Target", &["target.com"]),
];

/// Category slug and the keywords that select it.
pub const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "electronics",
        &[
            "laptop", "phone", "mobile", "tablet", "headphone", "earphone", "earbud", "speaker",
            "tv", "television", "monitor", "camera", "smartwatch", "watch", "charger",
            "powerbank", "ssd", "hdd", "ram", "processor", "gpu", "keyboard", "mouse", "router",
            "wifi", "bluetooth", "usb", "hdmi", "adapter",
        ],
    ),
    (
        "fashion",
        &[
            "shirt", "tshirt", "t-shirt", "jeans", "trouser", "pant", "dress", "kurta", "saree",
            "lehenga", "jacket", "hoodie", "sweater", "shoe", "sneaker", "sandal", "slipper",
            "bag", "handbag", "wallet", "belt", "watch", "sunglass",
        ],
    ),
    (
        "gaming",
        &[
            "game", "gaming", "ps5", "playstation", "xbox", "nintendo", "switch", "controller",
            "joystick", "gaming mouse", "gaming keyboard", "gaming headset", "steam",
            "epic games", "gpu", "graphics card", "rtx", "gtx",
        ],
    ),
    (
        "home-kitchen",
        &[
            "kitchen", "cookware", "utensil", "mixer", "grinder", "blender", "microwave", "oven",
            "refrigerator", "fridge", "washing machine", "ac", "air conditioner", "fan",
            "cooler", "heater", "vacuum", "iron", "mattress", "pillow", "bedsheet", "curtain",
            "furniture", "sofa", "chair", "table", "lamp", "light",
        ],
    ),
    (
        "beauty",
        &[
            "beauty", "skincare", "makeup", "cosmetic", "lipstick", "foundation", "mascara",
            "perfume", "fragrance", "shampoo", "conditioner", "hair", "moisturizer", "serum",
            "sunscreen", "face wash", "lotion", "cream",
        ],
    ),
    (
        "food-groceries",
        &[
            "food", "grocery", "snack", "chocolate", "biscuit", "chips", "drink", "beverage",
            "coffee", "tea", "rice", "dal", "oil", "masala", "spice", "fruit", "vegetable",
            "meat", "chicken", "fish", "dairy", "milk", "curd",
        ],
    ),
    (
        "mobile-accessories",
        &[
            "mobile cover", "phone case", "screen protector", "tempered glass", "mobile stand",
            "phone holder", "car mount", "wireless charger", "fast charger", "data cable",
            "usb cable", "type-c", "lightning", "airpods", "buds",
        ],
    ),
    (
        "books-stationery",
        &[
            "book", "novel", "textbook", "notebook", "diary", "pen", "pencil", "marker",
            "highlighter", "eraser", "sharpener", "ruler", "calculator", "backpack",
            "school bag", "stationery", "art supply",
        ],
    ),
    (
        "travel",
        &[
            "flight", "hotel", "booking", "travel", "trip", "vacation", "holiday", "luggage",
            "suitcase", "trolley", "passport", "visa", "ticket", "train", "bus", "cab", "uber",
            "ola", "makemytrip", "goibibo", "cleartrip",
        ],
    ),
];

/// Whether a title marks the post as a request or discussion rather than a deal.
#[must_use]
pub fn is_non_deal_title(title: &str) -> bool {
    let lower = title.to_lowercase();
    SKIP_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Store selling the product behind `url`, if it is one we know.
#[must_use]
pub fn detect_store(url: &str) -> Option<&'static str> {
    let lower = url.to_lowercase();
    STORE_PATTERNS
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| lower.contains(n)))
        .map(|(store, _)| *store)
}

/// Category slug for a post's text. Matching is by substring, so short
/// keywords can hit inside longer words; table order breaks ties.
#[must_use]
pub fn detect_category(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map_or(FALLBACK_CATEGORY, |(slug, _)| *slug)
}
