use crate::client::AwsClient;
use crate::error::AwsError;
use crate::query::QueryParameters;
use crate::service::ServiceConfig;
use crate::xml::{XmlDocument, XmlNode};
use base64::engine::general_purpose;
use base64::Engine;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueGrant {
    pub permission: String,
    pub id: Option<String>,
    pub display_name: Option<String>,
}

/// Client for the Simple Queue Service Query API.
///
/// Queue level actions are sent to the queue URL itself, as returned by
/// [`Sqs::create_queue`] or [`Sqs::list_queues`].
#[derive(Debug, Clone)]
pub struct Sqs {
    client: AwsClient,
    config: ServiceConfig,
}

impl Sqs {
    pub fn new(client: AwsClient) -> Self {
        Self::with_config(client, ServiceConfig::SQS)
    }

    pub fn with_config(client: AwsClient, config: ServiceConfig) -> Self {
        Self { client, config }
    }

    pub async fn list_queues(&self, prefix: Option<&str>) -> Result<Vec<String>, AwsError> {
        let doc = self
            .client
            .query(
                &self.config,
                QueryParameters::action("ListQueues").opt_param("QueueNamePrefix", prefix),
            )
            .await?;
        Ok(doc
            .list("//QueueUrl")
            .iter()
            .map(|n| n.text().to_string())
            .collect())
    }

    /// Returns the URL of the new queue, or of the existing one with that name.
    pub async fn create_queue(
        &self,
        name: &str,
        default_visibility_timeout: Option<u32>,
    ) -> Result<String, AwsError> {
        let doc = self
            .client
            .query(
                &self.config,
                QueryParameters::action("CreateQueue")
                    .param("QueueName", name)
                    .opt_param("DefaultVisibilityTimeout", default_visibility_timeout),
            )
            .await?;
        doc.required("//QueueUrl")
    }

    /// Without `force` only empty queues can be deleted.
    pub async fn delete_queue(&self, queue_url: &str, force: bool) -> Result<(), AwsError> {
        self.queue_action(
            queue_url,
            QueryParameters::action("DeleteQueue").param("ForceDeletion", force),
        )
        .await?;
        Ok(())
    }

    /// Numeric queue attributes by name, all of them when `attribute` is `None`.
    pub async fn get_queue_attributes(
        &self,
        queue_url: &str,
        attribute: Option<&str>,
    ) -> Result<BTreeMap<String, i64>, AwsError> {
        let doc = self
            .queue_action(
                queue_url,
                QueryParameters::action("GetQueueAttributes")
                    .param("Attribute", attribute.unwrap_or("All")),
            )
            .await?;

        let mut attributes = BTreeMap::new();
        for node in doc.list("//AttributedValue") {
            let name = node.required("Attribute")?;
            let value = node.required("Value")?.parse::<i64>()?;
            attributes.insert(name, value);
        }
        Ok(attributes)
    }

    pub async fn set_queue_attribute(
        &self,
        queue_url: &str,
        attribute: &str,
        value: &str,
    ) -> Result<(), AwsError> {
        self.queue_action(
            queue_url,
            QueryParameters::action("SetQueueAttributes")
                .param("Attribute", attribute)
                .param("Value", value),
        )
        .await?;
        Ok(())
    }

    /// Sends a message and returns its id. With `encode` the body travels
    /// Base64 encoded, which keeps arbitrary text intact.
    pub async fn send_message(
        &self,
        queue_url: &str,
        body: &str,
        encode: bool,
    ) -> Result<String, AwsError> {
        let body = if encode {
            general_purpose::STANDARD.encode(body)
        } else {
            body.to_string()
        };
        let doc = self
            .queue_action(
                queue_url,
                QueryParameters::action("SendMessage").param("MessageBody", body),
            )
            .await?;
        doc.required("//MessageId")
    }

    /// Looks at a message without changing its visibility.
    pub async fn peek_message(
        &self,
        queue_url: &str,
        message_id: &str,
        decode: bool,
    ) -> Result<Message, AwsError> {
        let doc = self
            .queue_action(
                queue_url,
                QueryParameters::action("PeekMessage").param("MessageId", message_id),
            )
            .await?;
        let message = doc
            .node("//Message")
            .ok_or_else(|| AwsError::MissingElement("//Message".to_string()))?;
        message_from(message, decode)
    }

    pub async fn receive_messages(
        &self,
        queue_url: &str,
        maximum: u32,
        visibility_timeout: Option<u32>,
        decode: bool,
    ) -> Result<Vec<Message>, AwsError> {
        let doc = self
            .queue_action(
                queue_url,
                QueryParameters::action("ReceiveMessage")
                    .param("NumberOfMessages", maximum)
                    .opt_param("VisibilityTimeout", visibility_timeout),
            )
            .await?;
        doc.list("//Message")
            .into_iter()
            .map(|node| message_from(node, decode))
            .collect()
    }

    pub async fn delete_message(&self, queue_url: &str, message_id: &str) -> Result<(), AwsError> {
        self.queue_action(
            queue_url,
            QueryParameters::action("DeleteMessage").param("MessageId", message_id),
        )
        .await?;
        Ok(())
    }

    pub async fn change_message_visibility(
        &self,
        queue_url: &str,
        message_id: &str,
        visibility_timeout: u64,
    ) -> Result<(), AwsError> {
        self.queue_action(
            queue_url,
            QueryParameters::action("ChangeMessageVisibility")
                .param("MessageId", message_id)
                .param("VisibilityTimeout", visibility_timeout),
        )
        .await?;
        Ok(())
    }

    pub async fn list_grants(
        &self,
        queue_url: &str,
        permission: Option<&str>,
        grantee: Option<&str>,
    ) -> Result<Vec<QueueGrant>, AwsError> {
        let mut params = QueryParameters::action("ListGrants").opt_param("Permission", permission);
        if let Some(grantee) = grantee {
            params = grantee_param(params, grantee);
        }
        let doc = self.queue_action(queue_url, params).await?;

        Ok(doc
            .list("//GrantList")
            .into_iter()
            .map(|node| QueueGrant {
                permission: node.value("Permission").unwrap_or_default(),
                id: node.value("Grantee/ID"),
                display_name: node.value("Grantee/DisplayName"),
            })
            .collect())
    }

    /// `grantee` is an email address or a canonical user id.
    pub async fn add_grant(
        &self,
        queue_url: &str,
        grantee: &str,
        permission: &str,
    ) -> Result<(), AwsError> {
        let params = QueryParameters::action("AddGrant").param("Permission", permission);
        self.queue_action(queue_url, grantee_param(params, grantee))
            .await?;
        Ok(())
    }

    pub async fn remove_grant(
        &self,
        queue_url: &str,
        grantee: &str,
        permission: &str,
    ) -> Result<(), AwsError> {
        let params = QueryParameters::action("RemoveGrant").param("Permission", permission);
        self.queue_action(queue_url, grantee_param(params, grantee))
            .await?;
        Ok(())
    }

    async fn queue_action(
        &self,
        queue_url: &str,
        params: QueryParameters,
    ) -> Result<XmlDocument, AwsError> {
        self.client.query_at(&self.config, queue_url, params).await
    }
}

fn grantee_param(params: QueryParameters, grantee: &str) -> QueryParameters {
    if grantee.contains('@') {
        params.param("Grantee.EmailAddress", grantee)
    } else {
        params.param("Grantee.ID", grantee)
    }
}

fn message_from(node: XmlNode<'_>, decode: bool) -> Result<Message, AwsError> {
    let id = node.required("MessageId")?;
    let body = node.required("MessageBody")?;
    let body = if decode {
        String::from_utf8(general_purpose::STANDARD.decode(body.trim())?)?
    } else {
        body
    };
    Ok(Message { id, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_client, MockResponse, MockServer};
    use pretty_assertions::assert_eq;

    fn sqs_for(server: &MockServer) -> Sqs {
        Sqs::with_config(
            test_client(),
            ServiceConfig::SQS.with_endpoint(server.url("/")),
        )
    }

    #[tokio::test]
    async fn test_list_and_create_queues() {
        let server = MockServer::start(|req, _| {
            let params = req.form_params();
            match params["Action"].as_str() {
                "ListQueues" => MockResponse::ok(
                    r#"<ListQueuesResponse xmlns="http://queue.amazonaws.com/doc/2007-05-01/">
  <Queues>
    <QueueUrl>https://queue.amazonaws.com/A1/test-1</QueueUrl>
    <QueueUrl>https://queue.amazonaws.com/A1/test-2</QueueUrl>
  </Queues>
</ListQueuesResponse>"#,
                ),
                _ => MockResponse::ok(
                    r#"<CreateQueueResponse xmlns="http://queue.amazonaws.com/doc/2007-05-01/">
  <QueueUrl>https://queue.amazonaws.com/A1/test-3</QueueUrl>
</CreateQueueResponse>"#,
                ),
            }
        })
        .await;
        let sqs = sqs_for(&server);

        let queues = sqs.list_queues(Some("test")).await.unwrap();
        assert_eq!(
            queues,
            vec![
                "https://queue.amazonaws.com/A1/test-1".to_string(),
                "https://queue.amazonaws.com/A1/test-2".to_string(),
            ]
        );
        let url = sqs.create_queue("test-3", Some(60)).await.unwrap();
        assert_eq!(url, "https://queue.amazonaws.com/A1/test-3");

        let requests = server.requests();
        let list = requests[0].form_params();
        assert_eq!(list["QueueNamePrefix"], "test");
        assert_eq!(list["Version"], "2007-05-01");
        let create = requests[1].form_params();
        assert_eq!(create["QueueName"], "test-3");
        assert_eq!(create["DefaultVisibilityTimeout"], "60");

        sqs.list_queues(None).await.unwrap();
        assert!(!server.requests()[2]
            .form_params()
            .contains_key("QueueNamePrefix"));
    }

    #[tokio::test]
    async fn test_get_method_sends_query_string() {
        let server = MockServer::respond_with(MockResponse::ok(
            r#"<ListQueuesResponse xmlns="http://queue.amazonaws.com/doc/2007-05-01/">
  <Queues/>
</ListQueuesResponse>"#,
        ))
        .await;
        let sqs = Sqs::with_config(
            test_client(),
            ServiceConfig::SQS
                .with_endpoint(server.url("/"))
                .with_http_method(http::Method::GET),
        );

        let queues = sqs.list_queues(Some("jobs")).await.unwrap();
        assert!(queues.is_empty());

        let request = &server.requests()[0];
        assert_eq!(request.method, "GET");
        assert_eq!(request.query_params()["QueueNamePrefix"], "jobs");
    }

    #[tokio::test]
    async fn test_messages_are_base64_encoded() {
        let server = MockServer::start(|req, _| {
            let params = req.form_params();
            match params["Action"].as_str() {
                "SendMessage" => MockResponse::ok(
                    r#"<SendMessageResponse xmlns="http://queue.amazonaws.com/doc/2007-05-01/">
  <MessageId>m-1</MessageId>
</SendMessageResponse>"#,
                ),
                _ => MockResponse::ok(
                    r#"<ReceiveMessageResponse xmlns="http://queue.amazonaws.com/doc/2007-05-01/">
  <Message><MessageId>m-1</MessageId><MessageBody>aGVsbG8gPHdvcmxkPg==</MessageBody></Message>
  <Message><MessageId>m-2</MessageId><MessageBody>Zm9v</MessageBody></Message>
</ReceiveMessageResponse>"#,
                ),
            }
        })
        .await;
        let sqs = sqs_for(&server);
        let queue = server.url("/A1/test");

        let id = sqs.send_message(&queue, "hello <world>", true).await.unwrap();
        assert_eq!(id, "m-1");

        let messages = sqs.receive_messages(&queue, 5, Some(30), true).await.unwrap();
        assert_eq!(
            messages,
            vec![
                Message {
                    id: "m-1".to_string(),
                    body: "hello <world>".to_string(),
                },
                Message {
                    id: "m-2".to_string(),
                    body: "foo".to_string(),
                },
            ]
        );

        let raw = sqs.receive_messages(&queue, 1, None, false).await.unwrap();
        assert_eq!(raw[1].body, "Zm9v");

        let requests = server.requests();
        assert_eq!(requests[0].path(), "/A1/test");
        assert_eq!(requests[0].form_params()["MessageBody"], "aGVsbG8gPHdvcmxkPg==");
        let receive = requests[1].form_params();
        assert_eq!(receive["NumberOfMessages"], "5");
        assert_eq!(receive["VisibilityTimeout"], "30");
        assert!(!requests[2].form_params().contains_key("VisibilityTimeout"));
    }

    #[tokio::test]
    async fn test_queue_attributes() {
        let server = MockServer::respond_with(MockResponse::ok(
            r#"<GetQueueAttributesResponse xmlns="http://queue.amazonaws.com/doc/2007-05-01/">
  <GetQueueAttributesResult>
    <AttributedValue><Attribute>VisibilityTimeout</Attribute><Value>30</Value></AttributedValue>
    <AttributedValue><Attribute>ApproximateNumberOfMessages</Attribute><Value>12</Value></AttributedValue>
  </GetQueueAttributesResult>
</GetQueueAttributesResponse>"#,
        ))
        .await;
        let sqs = sqs_for(&server);

        let attributes = sqs
            .get_queue_attributes(&server.url("/A1/q"), None)
            .await
            .unwrap();
        assert_eq!(attributes["VisibilityTimeout"], 30);
        assert_eq!(attributes["ApproximateNumberOfMessages"], 12);
        assert_eq!(server.requests()[0].form_params()["Attribute"], "All");
    }

    #[tokio::test]
    async fn test_queue_actions() {
        let server = MockServer::respond_with(MockResponse::ok(
            r#"<Response xmlns="http://queue.amazonaws.com/doc/2007-05-01/"><ResponseStatus><StatusCode>Success</StatusCode></ResponseStatus></Response>"#,
        ))
        .await;
        let sqs = sqs_for(&server);
        let queue = server.url("/A1/q");

        sqs.set_queue_attribute(&queue, "VisibilityTimeout", "90").await.unwrap();
        sqs.delete_message(&queue, "m-1").await.unwrap();
        sqs.change_message_visibility(&queue, "m-2", 120).await.unwrap();
        sqs.add_grant(&queue, "joe@example.com", "ReceiveMessage").await.unwrap();
        sqs.remove_grant(&queue, "canonical-id", "FullControl").await.unwrap();
        sqs.delete_queue(&queue, true).await.unwrap();

        let sent = server
            .requests()
            .iter()
            .map(|r| r.form_params())
            .collect::<Vec<_>>();
        assert_eq!(sent[0]["Attribute"], "VisibilityTimeout");
        assert_eq!(sent[0]["Value"], "90");
        assert_eq!(sent[1]["Action"], "DeleteMessage");
        assert_eq!(sent[2]["VisibilityTimeout"], "120");
        assert_eq!(sent[3]["Grantee.EmailAddress"], "joe@example.com");
        assert_eq!(sent[4]["Grantee.ID"], "canonical-id");
        assert_eq!(sent[5]["ForceDeletion"], "true");
    }

    #[tokio::test]
    async fn test_list_grants_and_peek() {
        let server = MockServer::start(|req, _| {
            match req.form_params()["Action"].as_str() {
                "ListGrants" => MockResponse::ok(
                    r#"<ListGrantsResponse xmlns="http://queue.amazonaws.com/doc/2007-05-01/">
  <GrantList><Grantee><ID>c1</ID><DisplayName>jane</DisplayName></Grantee><Permission>FullControl</Permission></GrantList>
</ListGrantsResponse>"#,
                ),
                _ => MockResponse::ok(
                    r#"<PeekMessageResponse xmlns="http://queue.amazonaws.com/doc/2007-05-01/">
  <Message><MessageId>m-9</MessageId><MessageBody>plain</MessageBody></Message>
</PeekMessageResponse>"#,
                ),
            }
        })
        .await;
        let sqs = sqs_for(&server);
        let queue = server.url("/A1/q");

        let grants = sqs.list_grants(&queue, None, None).await.unwrap();
        assert_eq!(
            grants,
            vec![QueueGrant {
                permission: "FullControl".to_string(),
                id: Some("c1".to_string()),
                display_name: Some("jane".to_string()),
            }]
        );

        let message = sqs.peek_message(&queue, "m-9", false).await.unwrap();
        assert_eq!(message.id, "m-9");
        assert_eq!(message.body, "plain");
    }

    #[tokio::test]
    async fn test_missing_queue() {
        let server = MockServer::respond_with(MockResponse::status(
            400,
            r#"<ErrorResponse xmlns="http://queue.amazonaws.com/doc/2007-05-01/">
  <Error><Type>Sender</Type><Code>AWS.SimpleQueueService.NonExistentQueue</Code><Message>The specified queue does not exist.</Message></Error>
  <RequestID>r-1</RequestID>
</ErrorResponse>"#,
        ))
        .await;
        let sqs = sqs_for(&server);

        let err = sqs
            .send_message(&server.url("/A1/gone"), "x", true)
            .await
            .unwrap_err();
        let service = err.service_error().unwrap();
        assert_eq!(service.status, 400);
        assert_eq!(
            service.code.as_deref(),
            Some("AWS.SimpleQueueService.NonExistentQueue")
        );
    }
}
