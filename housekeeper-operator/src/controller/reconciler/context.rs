use housekeeper_core::stamp::StampStore;
use k8s_openapi::api::core::v1::Node;
use kube::{Api, Client};

use crate::{agent_client::AgentClient, config::OperatorConfig};

pub struct ReconcilerContext {
    pub client: Client,
    pub config: OperatorConfig,
    pub stamps: StampStore,
    pub agent: AgentClient,
}

impl ReconcilerContext {
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        Self {
            stamps: StampStore::new(&config.stamp_directory),
            agent: AgentClient::new(&config.agent_endpoint),
            client,
            config,
        }
    }

    pub fn node_api(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }
}
