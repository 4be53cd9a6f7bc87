//! Metric catalog for the all-websites report.

use serde::Serialize;

pub const NB_VISITS: &str = "nb_visits";
pub const NB_ACTIONS: &str = "nb_actions";
pub const NB_PAGEVIEWS: &str = "nb_pageviews";
pub const GOAL_REVENUE: &str = "revenue";
pub const GOAL_CONVERSIONS: &str = "nb_conversions";
pub const ECOMMERCE_ORDERS: &str = "orders";
pub const ECOMMERCE_REVENUE: &str = "ecommerce_revenue";

/// One metric as exposed by the report: public name, archive record and the
/// column its evolution percentage is written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricDefinition {
    pub name: &'static str,
    pub translation_key: &'static str,
    pub evolution_column: &'static str,
    pub record_name: &'static str,
    pub is_ecommerce: bool,
}

impl MetricDefinition {
    /// Table metadata key holding this metric's total.
    pub fn total_key(&self) -> String {
        format!("total_{}", self.name)
    }

    /// Table metadata key holding the evolution of this metric's total.
    pub fn total_evolution_key(&self) -> String {
        format!("total_{}", self.evolution_column)
    }

    /// Table metadata key holding the previous period's total.
    pub fn last_period_total_key(&self) -> String {
        format!("last_period_total_{}", self.name)
    }
}

const BASE_METRICS: [MetricDefinition; 3] = [
    MetricDefinition {
        name: NB_VISITS,
        translation_key: "General_ColumnNbVisits",
        evolution_column: "visits_evolution",
        record_name: "nb_visits",
        is_ecommerce: false,
    },
    MetricDefinition {
        name: NB_ACTIONS,
        translation_key: "General_ColumnNbActions",
        evolution_column: "actions_evolution",
        record_name: "nb_actions",
        is_ecommerce: false,
    },
    MetricDefinition {
        name: NB_PAGEVIEWS,
        translation_key: "General_ColumnPageviews",
        evolution_column: "pageviews_evolution",
        record_name: "Actions_nb_pageviews",
        is_ecommerce: false,
    },
];

const GOAL_REVENUE_METRIC: MetricDefinition = MetricDefinition {
    name: GOAL_REVENUE,
    translation_key: "General_ColumnRevenue",
    evolution_column: "revenue_evolution",
    record_name: "Goal_revenue",
    is_ecommerce: false,
};

const ENHANCED_METRICS: [MetricDefinition; 3] = [
    MetricDefinition {
        name: GOAL_CONVERSIONS,
        translation_key: "Goals_ColumnConversions",
        evolution_column: "nb_conversions_evolution",
        record_name: "Goal_nb_conversions",
        is_ecommerce: false,
    },
    MetricDefinition {
        name: ECOMMERCE_ORDERS,
        translation_key: "General_EcommerceOrders",
        evolution_column: "orders_evolution",
        record_name: "Goal_ecommerceOrder_nb_conversions",
        is_ecommerce: true,
    },
    MetricDefinition {
        name: ECOMMERCE_REVENUE,
        translation_key: "General_ProductRevenue",
        evolution_column: "ecommerce_revenue_evolution",
        record_name: "Goal_ecommerceOrder_revenue",
        is_ecommerce: true,
    },
];

/// Ordered, immutable set of metrics for one request.
///
/// Entry order is the default column order of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricCatalog {
    metrics: Vec<MetricDefinition>,
}

impl MetricCatalog {
    /// Build the catalog for the given flags.
    ///
    /// Visits, actions and pageviews are always present. Goal revenue needs
    /// goal tracking; conversions and the two ecommerce metrics additionally
    /// need `enhanced`.
    pub fn build(enhanced: bool, goals_enabled: bool) -> Self {
        let mut metrics = BASE_METRICS.to_vec();
        if goals_enabled {
            metrics.push(GOAL_REVENUE_METRIC);
            if enhanced {
                metrics.extend(ENHANCED_METRICS);
            }
        }
        Self { metrics }
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.metrics.iter()
    }

    pub fn get(&self, name: &str) -> Option<&MetricDefinition> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.metrics.iter().map(|m| m.name).collect()
    }

    /// Archive fields to request from storage, in catalog order.
    pub fn record_names(&self) -> Vec<&'static str> {
        self.metrics.iter().map(|m| m.record_name).collect()
    }

    pub fn ecommerce(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.metrics.iter().filter(|m| m.is_ecommerce)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}
