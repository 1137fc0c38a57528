//! Shop directory backed by a fixed list.
//!
//! Used when no partner index is configured. With an empty configured list
//! the directory serves two demo partner shops for any zipcode.

use async_trait::async_trait;
use cleaners_core::error::LookupError;
use cleaners_core::shop::{PartnerShop, ShopDirectory, ShopPriority};

pub struct StaticShopDirectory {
    shops: Vec<PartnerShop>,
    demo: bool,
    max_shops: usize,
}

impl StaticShopDirectory {
    /// Serve `shops`, matching on zipcode. `"*"` matches every location.
    pub fn new(shops: Vec<PartnerShop>, max_shops: usize) -> Self {
        Self {
            shops,
            demo: false,
            max_shops: max_shops.max(1),
        }
    }

    /// Demo partners, stamped with whatever zipcode is asked for.
    pub fn demo() -> Self {
        Self {
            shops: demo_shops(),
            demo: true,
            max_shops: 3,
        }
    }
}

fn demo_shops() -> Vec<PartnerShop> {
    vec![
        PartnerShop {
            name: "클린마스터 세탁소".into(),
            zipcode: String::new(),
            priority: ShopPriority::Partner,
            rating: 4.8,
            specialties: vec!["실크".into(), "캐시미어".into(), "명품가방".into()],
            subscription_status: "active".into(),
        },
        PartnerShop {
            name: "프리미엄 드라이클리닝".into(),
            zipcode: String::new(),
            priority: ShopPriority::Partner,
            rating: 4.6,
            specialties: vec!["정장".into(), "웨딩드레스".into(), "가죽".into()],
            subscription_status: "active".into(),
        },
    ]
}

#[async_trait]
impl ShopDirectory for StaticShopDirectory {
    fn name(&self) -> &str {
        if self.demo { "demo" } else { "static" }
    }

    async fn find_by_location(&self, location: &str) -> Result<Vec<PartnerShop>, LookupError> {
        let location = location.trim();
        if location.is_empty() {
            return Ok(Vec::new());
        }

        let mut shops: Vec<PartnerShop> = if self.demo {
            self.shops
                .iter()
                .cloned()
                .map(|mut s| {
                    s.zipcode = location.to_string();
                    s
                })
                .collect()
        } else {
            self.shops
                .iter()
                .filter(|s| s.subscription_status == "active")
                .filter(|s| s.zipcode == "*" || s.zipcode.eq_ignore_ascii_case(location))
                .cloned()
                .collect()
        };

        shops.sort_by(PartnerShop::display_order);
        shops.truncate(self.max_shops);
        Ok(shops)
    }
}
