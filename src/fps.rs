use crate::client::AwsClient;
use crate::error::{AwsError, ServiceError};
use crate::query::QueryParameters;
use crate::service::ServiceConfig;
use crate::xml::{XmlDocument, XmlNode};
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Amount {
    pub amount: String,
    pub currency_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountBalance {
    pub total: Option<Amount>,
    pub pending_in: Option<Amount>,
    pub pending_out: Option<Amount>,
    pub disburse: Option<Amount>,
    pub refund: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub id: String,
    pub old_id: Option<String>,
    pub status: String,
    pub caller_installed: Option<String>,
    pub date_installed: Option<String>,
    pub caller_reference: Option<String>,
    pub token_type: Option<String>,
    pub friendly_name: Option<String>,
    pub payment_reason: Option<String>,
}

/// A token is limited either by an amount or by a number of uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageLimit {
    Amount {
        amount: Option<Amount>,
        last_reset_amount: Option<Amount>,
    },
    Count {
        count: u64,
        last_reset_count: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenUsageLimit {
    pub last_reset_timestamp: Option<String>,
    pub limit: UsageLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResult {
    pub id: String,
    pub operation: String,
    pub status: String,
    pub caller_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResults {
    pub number_pending: u32,
    pub results: Vec<TransactionResult>,
}

/// Parameters shared by `Pay` and `Reserve`.
#[derive(Debug, Clone, Default)]
pub struct PaymentRequest {
    pub recipient_token_id: String,
    pub sender_token_id: String,
    pub caller_token_id: String,
    pub caller_reference: String,
    pub amount: Amount,
    /// `Caller` or `Recipient`
    pub charge_fee_to: String,
    pub transaction_date: Option<String>,
    pub sender_reference: Option<String>,
    pub recipient_reference: Option<String>,
    pub caller_description: Option<String>,
    pub sender_description: Option<String>,
    pub recipient_description: Option<String>,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RefundRequest {
    pub refund_sender_token_id: String,
    pub caller_token_id: String,
    pub transaction_id: String,
    pub caller_reference: String,
    pub charge_fee_to: String,
    /// The full transaction amount when `None`
    pub amount: Option<Amount>,
    pub transaction_date: Option<String>,
    pub sender_reference: Option<String>,
    pub recipient_reference: Option<String>,
    pub caller_description: Option<String>,
    pub sender_description: Option<String>,
    pub recipient_description: Option<String>,
    pub metadata: Option<String>,
}

/// Outcome of a money moving action. `status` is the transaction status,
/// e.g. `Initiated` or `Success`, not the status of the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResponse {
    pub id: String,
    pub status: String,
    pub status_detail: Option<String>,
    pub token_usage: Vec<TokenUsageLimit>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPart {
    pub account_id: Option<String>,
    pub role: Option<String>,
    pub name: Option<String>,
    pub instrument_id: Option<String>,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub fee_paid: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub status: String,
    pub date: Option<String>,
    pub amount: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: String,
    pub caller_transaction_date: Option<String>,
    pub date_received: Option<String>,
    pub date_completed: Option<String>,
    pub transaction_amount: Option<Amount>,
    pub fees: Option<Amount>,
    pub balance: Option<Amount>,
    pub operation: Option<String>,
    pub payment_method: Option<String>,
    pub status: String,
    pub status_detail: Option<String>,
    pub caller_name: Option<String>,
    pub sender_name: Option<String>,
    pub recipient_name: Option<String>,
    pub caller_token_id: Option<String>,
    pub sender_token_id: Option<String>,
    pub recipient_token_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Option<String>,
    pub original_transaction_id: Option<String>,
    pub parts: Vec<TransactionPart>,
    pub related_transactions: Vec<String>,
    pub status_history: Vec<StatusChange>,
    pub token_usage: Vec<TokenUsageLimit>,
}

/// Client for the Flexible Payments Service Query API.
///
/// FPS answers failed actions with a successful HTTP status. Every response
/// whose top level `Status` is not `Success` is turned into
/// [`AwsError::Service`] here.
#[derive(Debug, Clone)]
pub struct Fps {
    client: AwsClient,
    config: ServiceConfig,
}

impl Fps {
    pub fn new(client: AwsClient) -> Self {
        Self::with_config(client, ServiceConfig::FPS)
    }

    pub fn with_config(client: AwsClient, config: ServiceConfig) -> Self {
        Self { client, config }
    }

    pub async fn get_account_balance(&self) -> Result<AccountBalance, AwsError> {
        let doc = self.send(QueryParameters::action("GetAccountBalance")).await?;
        let amount = |path: &str| doc.node(path).map(amount_from);
        Ok(AccountBalance {
            total: amount("//TotalBalance"),
            pending_in: amount("//PendingInBalance"),
            pending_out: amount("//PendingOutBalance"),
            disburse: amount("//DisburseBalance"),
            refund: amount("//RefundBalance"),
        })
    }

    pub async fn get_tokens(
        &self,
        friendly_name: Option<&str>,
        status: Option<&str>,
        caller_reference: Option<&str>,
    ) -> Result<Vec<Token>, AwsError> {
        let params = QueryParameters::action("GetTokens")
            .opt_param("TokenFriendlyName", friendly_name)
            .opt_param("TokenStatus", status)
            .opt_param("CallerReference", caller_reference);
        let doc = self.send(params).await?;
        doc.list("//Tokens").into_iter().map(token_from).collect()
    }

    pub async fn get_token_usage(&self, token_id: &str) -> Result<Vec<TokenUsageLimit>, AwsError> {
        let doc = self
            .send(QueryParameters::action("GetTokenUsage").param("TokenId", token_id))
            .await?;
        doc.list("//TokenUsageLimits")
            .into_iter()
            .map(usage_limit_from)
            .collect()
    }

    pub async fn cancel_token(&self, token_id: &str, reason: Option<&str>) -> Result<(), AwsError> {
        self.send(
            QueryParameters::action("CancelToken")
                .param("TokenId", token_id)
                .opt_param("ReasonText", reason),
        )
        .await?;
        Ok(())
    }

    /// Moves `amount` from the sender to the recipient.
    pub async fn pay(&self, request: &PaymentRequest) -> Result<TransactionResponse, AwsError> {
        let params = payment_params(QueryParameters::action("Pay"), request);
        self.transaction_response(params).await
    }

    /// Reserves `amount` on the sender's payment instrument, to be captured
    /// with [`Fps::settle`].
    pub async fn reserve(&self, request: &PaymentRequest) -> Result<TransactionResponse, AwsError> {
        let params = payment_params(QueryParameters::action("Reserve"), request);
        self.transaction_response(params).await
    }

    /// Captures a reservation, the full reserved amount when `amount` is `None`.
    pub async fn settle(
        &self,
        reserve_transaction_id: &str,
        amount: Option<&Amount>,
        transaction_date: Option<&str>,
    ) -> Result<TransactionResponse, AwsError> {
        let params = QueryParameters::action("Settle")
            .param("ReserveTransactionId", reserve_transaction_id)
            .opt_param("TransactionAmount.Amount", amount.map(|a| &a.amount))
            .opt_param("TransactionAmount.CurrencyCode", amount.map(|a| &a.currency_code))
            .opt_param("TransactionDate", transaction_date);
        self.transaction_response(params).await
    }

    pub async fn refund(&self, request: &RefundRequest) -> Result<TransactionResponse, AwsError> {
        let amount = request.amount.as_ref();
        let params = QueryParameters::action("Refund")
            .param("CallerTokenId", &request.caller_token_id)
            .param("RefundSenderTokenId", &request.refund_sender_token_id)
            .param("TransactionId", &request.transaction_id)
            .param("CallerReference", &request.caller_reference)
            .param("ChargeFeeTo", &request.charge_fee_to)
            .opt_param("RefundAmount.Amount", amount.map(|a| &a.amount))
            .opt_param("RefundAmount.CurrencyCode", amount.map(|a| &a.currency_code))
            .opt_param("TransactionDate", request.transaction_date.as_ref())
            .opt_param("RefundSenderReference", request.sender_reference.as_ref())
            .opt_param("RefundRecipientReference", request.recipient_reference.as_ref())
            .opt_param("RefundSenderDescription", request.sender_description.as_ref())
            .opt_param("RefundRecipientDescription", request.recipient_description.as_ref())
            .opt_param("CallerDescription", request.caller_description.as_ref())
            .opt_param("MetaData", request.metadata.as_ref());
        self.transaction_response(params).await
    }

    pub async fn retry_transaction(
        &self,
        original_transaction_id: &str,
    ) -> Result<TransactionResponse, AwsError> {
        self.transaction_response(
            QueryParameters::action("RetryTransaction")
                .param("OriginalTransactionId", original_transaction_id),
        )
        .await
    }

    pub async fn get_transaction(&self, transaction_id: &str) -> Result<Transaction, AwsError> {
        let doc = self
            .send(QueryParameters::action("GetTransaction").param("TransactionId", transaction_id))
            .await?;
        let node = doc
            .node("//Transaction")
            .ok_or_else(|| AwsError::MissingElement("Transaction".to_string()))?;
        transaction_from(node)
    }

    /// Results of asynchronous transactions not yet discarded.
    pub async fn get_results(
        &self,
        max_results_count: Option<u32>,
        operation: Option<&str>,
    ) -> Result<TransactionResults, AwsError> {
        let doc = self
            .send(
                QueryParameters::action("GetResults")
                    .opt_param("MaxResultsCount", max_results_count)
                    .opt_param("Operation", operation),
            )
            .await?;

        let results = doc
            .list("//TransactionResults")
            .into_iter()
            .map(|node| TransactionResult {
                id: node.value("TransactionId").unwrap_or_default(),
                operation: node.value("Operation").unwrap_or_default(),
                status: node.value("Status").unwrap_or_default(),
                caller_reference: node.value("CallerReference"),
            })
            .collect();

        Ok(TransactionResults {
            number_pending: doc.required("//NumberPending")?.trim().parse::<u32>()?,
            results,
        })
    }

    /// Returns the reported discard errors, empty when all went fine.
    pub async fn discard_results(&self, transaction_ids: &[&str]) -> Result<Vec<String>, AwsError> {
        let doc = self
            .send(QueryParameters::action("DiscardResults").indexed("TransactionIds", transaction_ids))
            .await?;
        Ok(doc
            .list("//DiscardErrors")
            .into_iter()
            .map(|n| n.text().to_string())
            .collect())
    }

    async fn transaction_response(
        &self,
        params: QueryParameters,
    ) -> Result<TransactionResponse, AwsError> {
        let doc = self.send(params).await?;
        let node = doc
            .node("//TransactionResponse")
            .ok_or_else(|| AwsError::MissingElement("TransactionResponse".to_string()))?;
        Ok(TransactionResponse {
            id: node.required("TransactionId")?,
            status: node.value("Status").unwrap_or_default(),
            status_detail: node.value("StatusDetail"),
            token_usage: token_usage_from(node)?,
        })
    }

    async fn send(&self, params: QueryParameters) -> Result<XmlDocument, AwsError> {
        let url = Url::parse(&self.config.endpoint)?;
        let params = self.client.build_query_parameters(
            self.config.api_version,
            self.config.signature_version,
            params,
        )?;
        let res = self
            .client
            .do_query(&self.config.http_method, url, params)
            .await?;

        let status = res.status();
        let body = res.text().await?;
        let doc = XmlDocument::parse(&body, self.config.xml_namespace)?;

        if doc.value("Status").as_deref() != Some("Success") {
            let mut err =
                ServiceError::new(status.as_u16(), status.canonical_reason().unwrap_or_default());
            err.apply_error_document(&doc);
            err.body = body;
            debug!("FPS action failed: {}", err);
            return Err(err.into());
        }

        Ok(doc)
    }
}

fn amount_from(node: XmlNode<'_>) -> Amount {
    Amount {
        amount: node.value("Amount").unwrap_or_default(),
        currency_code: node.value("CurrencyCode").unwrap_or_default(),
    }
}

fn payment_params(params: QueryParameters, request: &PaymentRequest) -> QueryParameters {
    params
        .param("RecipientTokenId", &request.recipient_token_id)
        .param("SenderTokenId", &request.sender_token_id)
        .param("CallerTokenId", &request.caller_token_id)
        .param("CallerReference", &request.caller_reference)
        .param("TransactionAmount.Amount", &request.amount.amount)
        .param("TransactionAmount.CurrencyCode", &request.amount.currency_code)
        .param("ChargeFeeTo", &request.charge_fee_to)
        .opt_param("TransactionDate", request.transaction_date.as_ref())
        .opt_param("SenderReference", request.sender_reference.as_ref())
        .opt_param("RecipientReference", request.recipient_reference.as_ref())
        .opt_param("SenderDescription", request.sender_description.as_ref())
        .opt_param("RecipientDescription", request.recipient_description.as_ref())
        .opt_param("CallerDescription", request.caller_description.as_ref())
        .opt_param("MetaData", request.metadata.as_ref())
}

fn token_usage_from(node: XmlNode<'_>) -> Result<Vec<TokenUsageLimit>, AwsError> {
    node.list("NewSenderTokenUsage")
        .into_iter()
        .map(usage_limit_from)
        .collect()
}

fn transaction_from(node: XmlNode<'_>) -> Result<Transaction, AwsError> {
    let parts = node
        .list("TransactionParts")
        .into_iter()
        .map(|part| TransactionPart {
            account_id: part.value("AccountId"),
            role: part.value("Role"),
            name: part.value("Name"),
            instrument_id: part.value("InstrumentId"),
            description: part.value("Description"),
            reference: part.value("Reference"),
            fee_paid: part.node("FeePaid").map(amount_from),
        })
        .collect();
    let status_history = node
        .list("StatusHistory")
        .into_iter()
        .map(|change| StatusChange {
            status: change.value("Status").unwrap_or_default(),
            date: change.value("Date"),
            amount: change.node("Amount").map(amount_from),
        })
        .collect();
    let related_transactions = node
        .list("RelatedTransactions/TransactionId")
        .into_iter()
        .map(|n| n.text().to_string())
        .collect();

    Ok(Transaction {
        id: node.required("TransactionId")?,
        caller_transaction_date: node.value("CallerTransactionDate"),
        date_received: node.value("DateReceived"),
        date_completed: node.value("DateCompleted"),
        transaction_amount: node.node("TransactionAmount").map(amount_from),
        fees: node.node("Fees").map(amount_from),
        balance: node.node("Balance").map(amount_from),
        operation: node.value("Operation"),
        payment_method: node.value("PaymentMethod"),
        status: node.value("Status").unwrap_or_default(),
        status_detail: node.value("StatusDetail"),
        caller_name: node.value("CallerName"),
        sender_name: node.value("SenderName"),
        recipient_name: node.value("RecipientName"),
        caller_token_id: node.value("CallerTokenId"),
        sender_token_id: node.value("SenderTokenId"),
        recipient_token_id: node.value("RecipientTokenId"),
        error_code: node.value("ErrorCode"),
        error_message: node.value("ErrorMessage"),
        metadata: node.value("Metadata"),
        original_transaction_id: node.value("OriginalTransactionId"),
        parts,
        related_transactions,
        status_history,
        token_usage: token_usage_from(node)?,
    })
}

fn token_from(node: XmlNode<'_>) -> Result<Token, AwsError> {
    Ok(Token {
        id: node.required("TokenId")?,
        old_id: node.value("OldTokenId"),
        status: node.value("Status").unwrap_or_default(),
        caller_installed: node.value("CallerInstalled"),
        date_installed: node.value("DateInstalled"),
        caller_reference: node.value("CallerReference"),
        token_type: node.value("TokenType"),
        friendly_name: node.value("FriendlyName"),
        payment_reason: node.value("PaymentReason"),
    })
}

fn usage_limit_from(node: XmlNode<'_>) -> Result<TokenUsageLimit, AwsError> {
    let limit = if node.node("Amount").is_some() {
        UsageLimit::Amount {
            amount: node.node("Amount").map(amount_from),
            last_reset_amount: node.node("LastResetAmount").map(amount_from),
        }
    } else {
        UsageLimit::Count {
            count: node.required("Count")?.trim().parse::<u64>()?,
            last_reset_count: node.required("LastResetCount")?.trim().parse::<u64>()?,
        }
    };

    Ok(TokenUsageLimit {
        last_reset_timestamp: node.value("LastResetTimeStamp"),
        limit,
    })
}
