use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_connect::types::QueueType;
use aws_sdk_connect::Client;
use capwatch_core::constants::NEXT_TOKEN_PARAM;
use capwatch_core::{ErrorKind, RemoteError};
use serde_json::{json, Map, Value};

use super::sdk_error;
use crate::traits::{ListingClient, ListingPage};

const SERVICE: &str = "connect";

/// Amazon Connect listing operations rendered as JSON pages
///
/// Every summary is reduced to `Id`, `Arn` and `Name` (plus `InstanceAlias`
/// for instances), which is all counting and discovery need.
#[derive(Clone)]
pub struct ConnectListingClient {
    client: Client,
}

fn summary(id: Option<&str>, arn: Option<&str>, name: Option<&str>) -> Value {
    json!({ "Id": id, "Arn": arn, "Name": name })
}

fn page(result_key: &str, items: Vec<Value>, next_token: Option<&str>) -> ListingPage {
    ListingPage::with_items(result_key, items, next_token.map(str::to_string))
}

fn string_param(
    params: &Map<String, Value>,
    name: &str,
    operation: &str,
) -> Result<String, RemoteError> {
    params
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            RemoteError::new(
                ErrorKind::Validation,
                SERVICE,
                operation,
                format!("missing required parameter {}", name),
            )
        })
}

impl ConnectListingClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    async fn describe_hierarchy(&self, instance_id: String) -> Result<ListingPage, RemoteError> {
        let operation = "describe_user_hierarchy_structure";
        let out = self
            .client
            .describe_user_hierarchy_structure()
            .instance_id(instance_id)
            .send()
            .await
            .map_err(|e| sdk_error(SERVICE, operation, e))?;

        let mut structure = Map::new();
        if let Some(h) = out.hierarchy_structure() {
            let levels = [
                ("LevelOne", h.level_one()),
                ("LevelTwo", h.level_two()),
                ("LevelThree", h.level_three()),
                ("LevelFour", h.level_four()),
                ("LevelFive", h.level_five()),
            ];
            for (key, level) in levels {
                let Some(level) = level else { continue };
                structure.insert(
                    key.to_string(),
                    summary(level.id(), level.arn(), level.name()),
                );
            }
        }

        let mut fields = Map::new();
        fields.insert("HierarchyStructure".to_string(), Value::Object(structure));
        Ok(ListingPage::new(fields, None))
    }
}

#[async_trait]
impl ListingClient for ConnectListingClient {
    #[tracing::instrument(skip(self, params), fields(aws.service.name = "connect"))]
    async fn invoke(
        &self,
        operation: &str,
        params: &Map<String, Value>,
    ) -> Result<ListingPage, RemoteError> {
        let token = params
            .get(NEXT_TOKEN_PARAM)
            .and_then(Value::as_str)
            .map(str::to_string);

        match operation {
            "list_instances" => {
                let out = self
                    .client
                    .list_instances()
                    .set_next_token(token)
                    .send()
                    .await
                    .map_err(|e| sdk_error(SERVICE, operation, e))?;
                let items = out
                    .instance_summary_list()
                    .iter()
                    .map(|s| json!({ "Id": s.id(), "Arn": s.arn(), "InstanceAlias": s.instance_alias() }))
                    .collect();
                Ok(page("InstanceSummaryList", items, out.next_token()))
            }
            "describe_user_hierarchy_structure" => {
                let instance_id = string_param(params, "InstanceId", operation)?;
                self.describe_hierarchy(instance_id).await
            }
            "list_users" => {
                let out = self
                    .client
                    .list_users()
                    .instance_id(string_param(params, "InstanceId", operation)?)
                    .set_next_token(token)
                    .send()
                    .await
                    .map_err(|e| sdk_error(SERVICE, operation, e))?;
                let items = out
                    .user_summary_list()
                    .iter()
                    .map(|s| summary(s.id(), s.arn(), s.username()))
                    .collect();
                Ok(page("UserSummaryList", items, out.next_token()))
            }
            "list_queues" => {
                let out = self
                    .client
                    .list_queues()
                    .instance_id(string_param(params, "InstanceId", operation)?)
                    .queue_types(QueueType::Standard)
                    .set_next_token(token)
                    .send()
                    .await
                    .map_err(|e| sdk_error(SERVICE, operation, e))?;
                let items = out
                    .queue_summary_list()
                    .iter()
                    .map(|s| summary(s.id(), s.arn(), s.name()))
                    .collect();
                Ok(page("QueueSummaryList", items, out.next_token()))
            }
            "list_phone_numbers" => {
                let out = self
                    .client
                    .list_phone_numbers()
                    .instance_id(string_param(params, "InstanceId", operation)?)
                    .set_next_token(token)
                    .send()
                    .await
                    .map_err(|e| sdk_error(SERVICE, operation, e))?;
                let items = out
                    .phone_number_summary_list()
                    .iter()
                    .map(|s| summary(s.id(), s.arn(), s.phone_number()))
                    .collect();
                Ok(page("PhoneNumberSummaryList", items, out.next_token()))
            }
            "list_hours_of_operations" => {
                let out = self
                    .client
                    .list_hours_of_operations()
                    .instance_id(string_param(params, "InstanceId", operation)?)
                    .set_next_token(token)
                    .send()
                    .await
                    .map_err(|e| sdk_error(SERVICE, operation, e))?;
                let items = out
                    .hours_of_operation_summary_list()
                    .iter()
                    .map(|s| summary(s.id(), s.arn(), s.name()))
                    .collect();
                Ok(page("HoursOfOperationSummaryList", items, out.next_token()))
            }
            "list_contact_flows" => {
                let out = self
                    .client
                    .list_contact_flows()
                    .instance_id(string_param(params, "InstanceId", operation)?)
                    .set_next_token(token)
                    .send()
                    .await
                    .map_err(|e| sdk_error(SERVICE, operation, e))?;
                let items = out
                    .contact_flow_summary_list()
                    .iter()
                    .map(|s| summary(s.id(), s.arn(), s.name()))
                    .collect();
                Ok(page("ContactFlowSummaryList", items, out.next_token()))
            }
            "list_routing_profiles" => {
                let out = self
                    .client
                    .list_routing_profiles()
                    .instance_id(string_param(params, "InstanceId", operation)?)
                    .set_next_token(token)
                    .send()
                    .await
                    .map_err(|e| sdk_error(SERVICE, operation, e))?;
                let items = out
                    .routing_profile_summary_list()
                    .iter()
                    .map(|s| summary(s.id(), s.arn(), s.name()))
                    .collect();
                Ok(page("RoutingProfileSummaryList", items, out.next_token()))
            }
            "list_security_profiles" => {
                let out = self
                    .client
                    .list_security_profiles()
                    .instance_id(string_param(params, "InstanceId", operation)?)
                    .set_next_token(token)
                    .send()
                    .await
                    .map_err(|e| sdk_error(SERVICE, operation, e))?;
                let items = out
                    .security_profile_summary_list()
                    .iter()
                    .map(|s| summary(s.id(), s.arn(), s.name()))
                    .collect();
                Ok(page("SecurityProfileSummaryList", items, out.next_token()))
            }
            "list_quick_connects" => {
                let out = self
                    .client
                    .list_quick_connects()
                    .instance_id(string_param(params, "InstanceId", operation)?)
                    .set_next_token(token)
                    .send()
                    .await
                    .map_err(|e| sdk_error(SERVICE, operation, e))?;
                let items = out
                    .quick_connect_summary_list()
                    .iter()
                    .map(|s| summary(s.id(), s.arn(), s.name()))
                    .collect();
                Ok(page("QuickConnectSummaryList", items, out.next_token()))
            }
            "list_agent_statuses" => {
                let out = self
                    .client
                    .list_agent_statuses()
                    .instance_id(string_param(params, "InstanceId", operation)?)
                    .set_next_token(token)
                    .send()
                    .await
                    .map_err(|e| sdk_error(SERVICE, operation, e))?;
                let items = out
                    .agent_status_summary_list()
                    .iter()
                    .map(|s| summary(s.id(), s.arn(), s.name()))
                    .collect();
                Ok(page("AgentStatusSummaryList", items, out.next_token()))
            }
            "list_prompts" => {
                let out = self
                    .client
                    .list_prompts()
                    .instance_id(string_param(params, "InstanceId", operation)?)
                    .set_next_token(token)
                    .send()
                    .await
                    .map_err(|e| sdk_error(SERVICE, operation, e))?;
                let items = out
                    .prompt_summary_list()
                    .iter()
                    .map(|s| summary(s.id(), s.arn(), s.name()))
                    .collect();
                Ok(page("PromptSummaryList", items, out.next_token()))
            }
            "list_task_templates" => {
                let out = self
                    .client
                    .list_task_templates()
                    .instance_id(string_param(params, "InstanceId", operation)?)
                    .set_next_token(token)
                    .send()
                    .await
                    .map_err(|e| sdk_error(SERVICE, operation, e))?;
                let items = out
                    .task_templates()
                    .iter()
                    .map(|s| summary(s.id(), s.arn(), s.name()))
                    .collect();
                Ok(page("TaskTemplates", items, out.next_token()))
            }
            other => Err(RemoteError::new(
                ErrorKind::UnknownStrategy,
                SERVICE,
                other,
                "operation is not supported by the connect listing client",
            )),
        }
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        self.client
            .list_instances()
            .max_results(1)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| sdk_error(SERVICE, "list_instances", e))
    }
}
