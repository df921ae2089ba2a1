use crate::client::AwsClient;
use crate::error::AwsError;
use crate::query::QueryParameters;
use crate::service::ServiceConfig;
use crate::xml::XmlDocument;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct BoxUsage {
    prior: f64,
    total: f64,
}

/// Client for the SimpleDB Query API.
///
/// Every response reports the machine time it consumed as `BoxUsage`. The
/// last value and the running total are kept per client and shared between
/// its clones.
#[derive(Debug, Clone)]
pub struct SimpleDb {
    client: AwsClient,
    config: ServiceConfig,
    usage: Arc<Mutex<BoxUsage>>,
}

impl SimpleDb {
    pub fn new(client: AwsClient) -> Self {
        Self::with_config(client, ServiceConfig::SIMPLE_DB)
    }

    pub fn with_config(client: AwsClient, config: ServiceConfig) -> Self {
        Self {
            client,
            config,
            usage: Arc::new(Mutex::new(BoxUsage::default())),
        }
    }

    /// Box usage of the most recent request
    pub fn prior_box_usage(&self) -> f64 {
        self.usage.lock().prior
    }

    pub fn total_box_usage(&self) -> f64 {
        self.usage.lock().total
    }

    /// Follows `NextToken` until all domain names are fetched.
    pub async fn list_domains(&self, max_domains: u32) -> Result<Vec<String>, AwsError> {
        let mut domains = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let params = QueryParameters::action("ListDomains")
                .param("MaxNumberOfDomains", max_domains)
                .opt_param("NextToken", next_token.take());
            let doc = self.send(params).await?;

            domains.extend(
                doc.list("//DomainName")
                    .into_iter()
                    .map(|n| n.text().to_string()),
            );

            match doc.value("//NextToken") {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }

        Ok(domains)
    }

    pub async fn create_domain(&self, name: &str) -> Result<(), AwsError> {
        self.send(QueryParameters::action("CreateDomain").param("DomainName", name))
            .await?;
        Ok(())
    }

    pub async fn delete_domain(&self, name: &str) -> Result<(), AwsError> {
        self.send(QueryParameters::action("DeleteDomain").param("DomainName", name))
            .await?;
        Ok(())
    }

    /// Repeat a name to store several values for it. With `replace` the new
    /// values overwrite the existing ones instead of being added.
    pub async fn put_attributes(
        &self,
        domain: &str,
        item: &str,
        attributes: &[(&str, &str)],
        replace: bool,
    ) -> Result<(), AwsError> {
        let attributes = attributes
            .iter()
            .map(|(name, value)| (*name, Some(*value)))
            .collect::<Vec<_>>();
        let params = attribute_params(
            QueryParameters::action("PutAttributes")
                .param("DomainName", domain)
                .param("ItemName", item),
            &attributes,
            replace,
        );
        self.send(params).await?;
        Ok(())
    }

    /// Values of one item by attribute name, restricted to `attribute_name` if
    /// given. Missing values come back as empty strings.
    pub async fn get_attributes(
        &self,
        domain: &str,
        item: &str,
        attribute_name: Option<&str>,
    ) -> Result<BTreeMap<String, Vec<String>>, AwsError> {
        let doc = self
            .send(
                QueryParameters::action("GetAttributes")
                    .param("DomainName", domain)
                    .param("ItemName", item)
                    .opt_param("AttributeName", attribute_name),
            )
            .await?;

        let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for node in doc.list("//Attribute") {
            let name = node.required("Name")?;
            let value = node.value("Value").unwrap_or_default();
            attributes.entry(name).or_default().push(value);
        }
        Ok(attributes)
    }

    /// `None` as value deletes every value of that name, an empty slice
    /// deletes the whole item.
    pub async fn delete_attributes(
        &self,
        domain: &str,
        item: &str,
        attributes: &[(&str, Option<&str>)],
    ) -> Result<(), AwsError> {
        let params = attribute_params(
            QueryParameters::action("DeleteAttributes")
                .param("DomainName", domain)
                .param("ItemName", item),
            attributes,
            false,
        );
        self.send(params).await?;
        Ok(())
    }

    /// Item names matching `expression`, all items without one. Only the first
    /// page of at most `max_items` is returned unless `fetch_all` is set.
    pub async fn query(
        &self,
        domain: &str,
        expression: Option<&str>,
        max_items: u32,
        fetch_all: bool,
    ) -> Result<Vec<String>, AwsError> {
        let mut items = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let params = QueryParameters::action("Query")
                .param("DomainName", domain)
                .opt_param("QueryExpression", expression)
                .param("MaxNumberOfItems", max_items)
                .opt_param("NextToken", next_token.take());
            let doc = self.send(params).await?;

            items.extend(
                doc.list("//ItemName")
                    .into_iter()
                    .map(|n| n.text().to_string()),
            );

            match doc.value("//NextToken") {
                Some(token) if fetch_all && !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }

        Ok(items)
    }

    async fn send(&self, params: QueryParameters) -> Result<XmlDocument, AwsError> {
        let doc = self.client.query(&self.config, params).await?;

        let prior = match doc.value("//BoxUsage") {
            Some(usage) => usage.trim().parse::<f64>()?,
            None => 0.0,
        };
        let mut usage = self.usage.lock();
        usage.prior = prior;
        usage.total += prior;
        debug!("SimpleDB box usage {} (total {})", usage.prior, usage.total);

        Ok(doc)
    }
}

/// Attributes are numbered from 0 in the order given.
fn attribute_params(
    mut params: QueryParameters,
    attributes: &[(&str, Option<&str>)],
    replace: bool,
) -> QueryParameters {
    for (idx, (name, value)) in attributes.iter().enumerate() {
        params.insert(format!("Attribute.{}.Name", idx), Some(name.to_string()));
        params.insert(format!("Attribute.{}.Value", idx), value.map(str::to_string));
        if replace {
            params.insert(format!("Attribute.{}.Replace", idx), Some("true".to_string()));
        }
    }
    params
}
