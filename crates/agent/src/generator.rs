//! Stage 3: question + intent + plan → reporting query.

use std::sync::Arc;

use shopcast_ai::CompletionService;
use shopcast_ai::parser::{extract_query, truncate_for_log};
use shopcast_core::{DataSource, Field, Intent, Plan, ReportQuery, TimeRange};
use tracing::warn;

const MAX_TOKENS: u32 = 1000;
const DEFAULT_LIMIT: u64 = 10;
const DEFAULT_STOCK_THRESHOLD: u64 = 50;

/// `(expression, alias)` for an order metric.
fn metric_expr(metric: &str) -> (&'static str, &'static str) {
    match metric {
        "revenue" | "total_sales" => ("SUM(total_price)", "total_sales"),
        "order_count" => ("COUNT(order_id)", "order_count"),
        _ => ("SUM(quantity)", "total_quantity"),
    }
}

/// Deterministic query for a plan, built from its first data source and primary metric.
pub fn template_query(intent: &Intent, plan: &Plan) -> String {
    let query = match plan.primary_source() {
        DataSource::Orders => {
            let (expr, alias) = metric_expr(&plan.primary_metric);
            let mut query = ReportQuery::new(
                DataSource::Orders,
                vec![Field::new("product_name"), Field::aliased(expr, alias)],
            );

            let mut predicates = Vec::new();
            if let Some(range) = plan.filter("date_range") {
                let days = TimeRange::parse(range).map(|r| r.days()).unwrap_or(30);
                predicates.push(format!("created_at >= DATE_SUB(NOW(), INTERVAL {days} DAY)"));
            }
            if let Some(product) = plan.filter("product_name").or_else(|| intent.product_name()) {
                predicates.push(format!("product_name = '{}'", product.replace('\'', "''")));
            }
            if !predicates.is_empty() {
                query = query.with_predicate(predicates.join(" AND "));
            }

            if plan.groups_by("product_name") {
                query = query.with_group_by("product_name").with_order_by(alias, true);
            }
            let limit = plan
                .filter("limit")
                .and_then(|l| l.trim().parse().ok())
                .unwrap_or(DEFAULT_LIMIT);
            query.with_limit(limit)
        }
        DataSource::Products => {
            let threshold = plan
                .filter("stock_threshold")
                .and_then(|t| t.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_STOCK_THRESHOLD);
            ReportQuery::new(
                DataSource::Products,
                vec![Field::new("product_name"), Field::new("inventory_quantity")],
            )
            .with_predicate(format!("inventory_quantity < {threshold}"))
        }
        DataSource::Customers => ReportQuery::new(
            DataSource::Customers,
            vec![
                Field::new("customer_email"),
                Field::aliased("COUNT(order_id)", "order_count"),
            ],
        )
        .with_group_by("customer_email")
        .with_having("order_count > 1"),
    };
    query.to_string()
}

/// Completion-backed generator.
pub struct QueryGenerator {
    completion: Arc<dyn CompletionService>,
}

impl QueryGenerator {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    /// Never fails; falls back to [`template_query`] when no valid query comes back.
    pub async fn generate(&self, question: &str, intent: &Intent, plan: &Plan) -> String {
        let prompt = generation_prompt(question, intent, plan);
        let reply = match self.completion.complete(&prompt, MAX_TOKENS).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(service = self.completion.name(), error = %e, "query generation failed; using template query");
                return template_query(intent, plan);
            }
        };

        let query = match extract_query(&reply) {
            Ok(query) => query,
            Err(e) => {
                warn!(error = %e, response = %truncate_for_log(&reply, 200), "no query in response; using template query");
                return template_query(intent, plan);
            }
        };

        match ReportQuery::parse(&query) {
            Ok(_) => query,
            Err(e) => {
                warn!(error = %e, query = %truncate_for_log(&query, 200), "generated query is not valid; using template query");
                template_query(intent, plan)
            }
        }
    }
}

fn generation_prompt(question: &str, intent: &Intent, plan: &Plan) -> String {
    let entities = serde_json::to_string(&intent.entities).unwrap_or_default();
    let filters = serde_json::to_string(&plan.filters).unwrap_or_default();
    let sources: Vec<&str> = plan.data_sources.iter().map(DataSource::as_str).collect();
    let vocabulary: String = DataSource::ALL
        .iter()
        .map(|s| format!("- {}: {}\n", s, s.fields().join(", ")))
        .collect();

    format!(
        r#"Write one reporting query that answers this store analytics question.

Question: "{question}"

Intent:
- Domain: {domain}
- Entities: {entities}

Plan:
- Data sources: {sources}
- Primary metric: {metric}
- Aggregations: {aggregations}
- Filters: {filters}
- Group by: {group_by}

Query examples:
1. FROM orders SHOW total_sales, order_count WHERE created_at >= '2024-01-01'
2. FROM products SHOW product_name, inventory_quantity WHERE inventory_quantity < 10
3. FROM orders SHOW product_name, SUM(quantity) AS total_quantity GROUP BY product_name ORDER BY total_quantity DESC LIMIT 5
4. FROM customers SHOW customer_email, COUNT(order_id) AS order_count GROUP BY customer_email HAVING order_count > 1

Fields per data source:
{vocabulary}
Rules:
- Query a single data source and start with FROM
- Put date filters in WHERE, aggregations in GROUP BY, rankings in ORDER BY and LIMIT
- Only use the fields listed above

Reply with the query only, without explanation or markdown."#,
        domain = intent.domain,
        sources = sources.join(", "),
        metric = plan.primary_metric,
        aggregations = plan.aggregations.join(", "),
        group_by = plan.group_by.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::default_plan;
    use shopcast_ai::completion::testing::{FailingCompletion, ScriptedCompletion};
    use shopcast_core::{Domain, ForecastSettings};

    fn plan_for(domain: Domain) -> Plan {
        default_plan(domain, &ForecastSettings::default())
    }

    #[test]
    fn order_templates_follow_the_plan() {
        let intent = Intent::fallback();
        assert_eq!(
            template_query(&intent, &plan_for(Domain::SalesAnalysis)),
            "FROM orders SHOW product_name, SUM(quantity) AS total_quantity \
             WHERE created_at >= DATE_SUB(NOW(), INTERVAL 30 DAY) \
             GROUP BY product_name ORDER BY total_quantity DESC LIMIT 10"
        );
        assert_eq!(
            template_query(&intent, &plan_for(Domain::ProductRanking)),
            "FROM orders SHOW product_name, SUM(quantity) AS total_quantity \
             WHERE created_at >= DATE_SUB(NOW(), INTERVAL 30 DAY) \
             GROUP BY product_name ORDER BY total_quantity DESC LIMIT 5"
        );
    }

    #[test]
    fn product_filter_and_metric_shape_the_order_template() {
        let plan = plan_for(Domain::InventoryForecasting).with_filter("product_name", "Blue T-Shirt");
        assert_eq!(
            template_query(&Intent::fallback(), &plan),
            "FROM orders SHOW product_name, SUM(quantity) AS total_quantity \
             WHERE created_at >= DATE_SUB(NOW(), INTERVAL 90 DAY) AND product_name = 'Blue T-Shirt' \
             GROUP BY product_name ORDER BY total_quantity DESC LIMIT 10"
        );

        let revenue = Plan::new(vec![DataSource::Orders], "revenue");
        assert_eq!(
            template_query(&Intent::fallback(), &revenue),
            "FROM orders SHOW product_name, SUM(total_price) AS total_sales LIMIT 10"
        );
    }

    #[test]
    fn product_and_customer_templates_are_fixed() {
        let intent = Intent::fallback();
        assert_eq!(
            template_query(&intent, &plan_for(Domain::InventoryStatus)),
            "FROM products SHOW product_name, inventory_quantity WHERE inventory_quantity < 50"
        );
        assert_eq!(
            template_query(&intent, &plan_for(Domain::CustomerAnalysis)),
            "FROM customers SHOW customer_email, COUNT(order_id) AS order_count \
             GROUP BY customer_email HAVING order_count > 1"
        );
    }

    #[test]
    fn every_template_is_a_valid_query() {
        for domain in Domain::ALL {
            let plan = plan_for(domain).with_filter("product_name", "Kid's Cap");
            let query = template_query(&Intent::fallback(), &plan);
            assert!(ReportQuery::parse(&query).is_ok(), "{query}");
        }
    }

    #[tokio::test]
    async fn chatty_replies_are_cleaned() {
        let generator = QueryGenerator::new(Arc::new(ScriptedCompletion::new([
            "Here is the query:\n\nFROM orders SHOW product_name\n\nLet me know if you need more.",
        ])));
        let query = generator
            .generate("q", &Intent::fallback(), &plan_for(Domain::SalesAnalysis))
            .await;
        assert_eq!(query, "FROM orders SHOW product_name");
    }

    #[tokio::test]
    async fn terminated_queries_are_kept() {
        let generator = QueryGenerator::new(Arc::new(ScriptedCompletion::new([
            "FROM orders SHOW product_name, SUM(quantity) AS total_quantity GROUP BY product_name \
             ORDER BY total_quantity DESC LIMIT 3;",
        ])));
        let query = generator
            .generate("q", &Intent::fallback(), &plan_for(Domain::ProductRanking))
            .await;
        assert_eq!(
            query,
            "FROM orders SHOW product_name, SUM(quantity) AS total_quantity GROUP BY product_name \
             ORDER BY total_quantity DESC LIMIT 3"
        );
    }

    #[tokio::test]
    async fn unusable_replies_fall_back_to_the_template() {
        let plan = plan_for(Domain::InventoryStatus);
        let expected = template_query(&Intent::fallback(), &plan);

        let failing = QueryGenerator::new(Arc::new(FailingCompletion::default()));
        assert_eq!(failing.generate("q", &Intent::fallback(), &plan).await, expected);

        let service = Arc::new(ScriptedCompletion::new([
            "Sorry, I can't help with that.",
            "FROM refunds SHOW amount",
        ]));
        let generator = QueryGenerator::new(service);
        assert_eq!(generator.generate("q", &Intent::fallback(), &plan).await, expected);
        assert_eq!(generator.generate("q", &Intent::fallback(), &plan).await, expected);
    }
}
