/// One independently scraped category with its own landing URL and
/// completion artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub label: String,
    pub url: String,
}

impl Section {
    pub fn new(label: &str, url: &str) -> Self {
        Self {
            label: label.to_string(),
            url: url.to_string(),
        }
    }
}

/// The fixed category table. Collection order follows this list.
pub fn targets() -> Vec<Section> {
    vec![
        Section::new(
            "Fresh Fruits & Vegetables",
            "https://voila.ca/categories/fresh-fruits-vegetables/WEB1100606",
        ),
        Section::new(
            "Meat & Seafood",
            "https://voila.ca/categories/meat-seafood/WEB1100609",
        ),
        Section::new(
            "Dairy & Eggs",
            "https://voila.ca/categories/dairy-eggs/WEB1100610",
        ),
        Section::new(
            "Cheese",
            "https://voila.ca/categories/cheese/WEB1504630?source=navigation",
        ),
        // "Bread & Bakery" (WEB1100608) and "Pantry" (WEB1100615) are deliberately
        // left out: both are dominated by shelf-stable items we don't plan around.
        Section::new("Deli", "https://voila.ca/categories/deli/WEB1100607"),
        Section::new(
            "Frozen Foods",
            "https://voila.ca/categories/frozen-foods/WEB1100612",
        ),
        Section::new(
            "Scene+ Deals",
            "https://voila.ca/categories/scene-deals/WEB18638414?source=navigation",
        ),
        Section::new(
            "Flyer Deals",
            "https://voila.ca/categories/flyer-deals/WEB19082285?source=navigation",
        ),
    ]
}
