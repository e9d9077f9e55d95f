//! Subscription plans and their prices.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plan {
    Week,
    Month,
    HalfYear,
    Year,
    Forever,
}

/// How long a grant lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Term {
    Days(u32),
    Forever,
}

impl Term {
    /// Label stored in `subscriptions.plan` for admin grants.
    pub fn plan_label(&self) -> String {
        match self {
            Term::Days(days) => format!("{days}_days"),
            Term::Forever => "forever".to_string(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Term::Days(days) => format!("на {days} дней"),
            Term::Forever => "НАВСЕГДА".to_string(),
        }
    }
}

impl Plan {
    pub const ALL: [Plan; 5] = [Plan::Week, Plan::Month, Plan::HalfYear, Plan::Year, Plan::Forever];

    pub fn key(&self) -> &'static str {
        match self {
            Plan::Week => "7_days",
            Plan::Month => "30_days",
            Plan::HalfYear => "180_days",
            Plan::Year => "360_days",
            Plan::Forever => "forever",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.key() == key)
    }

    pub fn term(&self) -> Term {
        match self {
            Plan::Week => Term::Days(7),
            Plan::Month => Term::Days(30),
            Plan::HalfYear => Term::Days(180),
            Plan::Year => Term::Days(360),
            Plan::Forever => Term::Forever,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Plan::Week => "7 дней",
            Plan::Month => "30 дней",
            Plan::HalfYear => "180 дней",
            Plan::Year => "360 дней",
            Plan::Forever => "Навсегда",
        }
    }

    pub fn default_price(&self) -> u32 {
        match self {
            Plan::Week => 39,
            Plan::Month => 99,
            Plan::HalfYear => 499,
            Plan::Year => 899,
            Plan::Forever => 1499,
        }
    }
}

/// Ruble prices per plan, defaults overridable from config.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceList {
    prices: HashMap<Plan, u32>,
}

impl PriceList {
    pub fn with_overrides(overrides: &HashMap<Plan, u32>) -> Self {
        let prices = Plan::ALL
            .into_iter()
            .map(|plan| (plan, overrides.get(&plan).copied().unwrap_or(plan.default_price())))
            .collect();
        Self { prices }
    }

    pub fn price(&self, plan: Plan) -> u32 {
        self.prices.get(&plan).copied().unwrap_or(plan.default_price())
    }

    /// Text of the plan-picker button, e.g. "30 дней — 99₽".
    pub fn button_text(&self, plan: Plan) -> String {
        match plan {
            Plan::Forever => format!("{} (только 100 чел.) — {}₽", plan.title(), self.price(plan)),
            _ => format!("{} — {}₽", plan.title(), self.price(plan)),
        }
    }
}

impl Default for PriceList {
    fn default() -> Self {
        Self::with_overrides(&HashMap::new())
    }
}
