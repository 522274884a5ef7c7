// src/plans.rs
//
// Таблица тарифов: plan_id -> цена + лимиты. Бизнес-условия не зашиты в
// логику: таблицу можно подменить JSON-файлом через PLAN_CONFIG_PATH.

use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PlanLimits {
    pub max_jobs: i32,
    pub max_candidates: i32,
    pub max_team_members: i32,
    pub support_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Plan {
    pub price: f64,
    pub currency: String,
    pub duration_days: i64,
    pub limits: PlanLimits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanTable {
    plans: HashMap<String, Plan>,
    free_tier: PlanLimits,
}

impl PlanTable {
    /// PLAN_CONFIG_PATH указывает на JSON с полями `plans` и `free_tier`;
    /// без него используются встроенные значения по умолчанию.
    pub fn from_env() -> Self {
        match std::env::var("PLAN_CONFIG_PATH") {
            Ok(path) => match std::fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str::<PlanTable>(&raw) {
                    Ok(table) => table,
                    Err(e) => {
                        log::error!("plan config parse error ({path}): {e}, using defaults");
                        Self::defaults()
                    }
                },
                Err(e) => {
                    log::error!("plan config read error ({path}): {e}, using defaults");
                    Self::defaults()
                }
            },
            Err(_) => Self::defaults(),
        }
    }

    pub fn defaults() -> Self {
        let mut plans = HashMap::new();
        plans.insert(
            "premium".to_string(),
            Plan {
                price: 999.0,
                currency: "INR".to_string(),
                duration_days: 30,
                limits: PlanLimits {
                    max_jobs: 50,
                    max_candidates: 1000,
                    max_team_members: 5,
                    support_level: "Priority".to_string(),
                },
            },
        );
        plans.insert(
            "elite".to_string(),
            Plan {
                price: 2499.0,
                currency: "INR".to_string(),
                duration_days: 30,
                limits: PlanLimits {
                    max_jobs: 200,
                    max_candidates: 5000,
                    max_team_members: 20,
                    support_level: "Dedicated".to_string(),
                },
            },
        );

        PlanTable {
            plans,
            free_tier: PlanLimits {
                max_jobs: 10,
                max_candidates: 100,
                max_team_members: 2,
                support_level: "Basic".to_string(),
            },
        }
    }

    pub fn get(&self, plan_id: &str) -> Option<&Plan> {
        self.plans.get(plan_id)
    }

    pub fn free_tier(&self) -> &PlanLimits {
        &self.free_tier
    }
}

/// Цена в виде строки под NUMERIC(10,2).
pub fn format_price(price: f64) -> String {
    format!("{price:.2}")
}
