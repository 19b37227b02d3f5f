use crate::{client::Client, proto, Result};
use std::fmt;
use tracing::debug;

/// Request to obtain the current topology of the cluster the gateway is part of.
#[derive(Debug)]
pub struct TopologyBuilder(Client);

impl TopologyBuilder {
    /// Create a new topology request builder.
    pub fn new(client: Client) -> Self {
        TopologyBuilder(client)
    }

    /// Send a topology request to the configured gateway.
    #[tracing::instrument(skip(self), name = "topology", err)]
    pub async fn send(mut self) -> Result<TopologyResponse> {
        let req = proto::TopologyRequest {};
        debug!(?req, "sending request");

        let res = self
            .0
            .gateway_client
            .topology(tonic::Request::new(req))
            .await?;
        Ok(TopologyResponse(res.into_inner()))
    }
}

/// The current topology of the cluster
#[derive(Debug)]
pub struct TopologyResponse(proto::TopologyResponse);

impl TopologyResponse {
    /// List of brokers part of this cluster
    pub fn brokers(&self) -> impl Iterator<Item = BrokerInfo<'_>> {
        self.0.brokers.iter().map(BrokerInfo)
    }

    /// How many nodes are in the cluster.
    pub fn cluster_size(&self) -> u32 {
        self.0.cluster_size as u32
    }

    /// How many partitions are spread across the cluster.
    pub fn partitions_count(&self) -> u32 {
        self.0.partitions_count as u32
    }

    /// gateway version
    pub fn gateway_version(&self) -> &str {
        &self.0.gateway_version
    }
}

/// Zeebe broker info
#[derive(Debug)]
pub struct BrokerInfo<'a>(&'a proto::BrokerInfo);

impl<'a> BrokerInfo<'a> {
    /// Unique (within a cluster) node ID for the broker.
    pub fn node_id(&self) -> i32 {
        self.0.node_id
    }

    /// Hostname of the broker.
    pub fn host(&self) -> &'a str {
        let broker = self.0;
        &broker.host
    }

    /// Port for the broker.
    pub fn port(&self) -> u32 {
        self.0.port as u32
    }

    /// List of partitions managed or replicated on this broker.
    pub fn partitions(&self) -> impl Iterator<Item = Partition> + 'a {
        let broker = self.0;
        broker.partitions.iter().map(|proto| Partition(proto.clone()))
    }
}

/// Zeebe partition.
#[derive(Debug)]
pub struct Partition(proto::Partition);

impl Partition {
    /// the unique ID of this partition
    pub fn partition_id(&self) -> i32 {
        self.0.partition_id
    }

    /// The role of the broker for this partition.
    pub fn role(&self) -> PartitionRole {
        PartitionRole::from(self.0.role)
    }
}

/// Raft role of a broker for one partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionRole {
    /// The broker leads the partition.
    Leader,
    /// The broker replicates the partition.
    Follower,
    /// The broker holds the partition but takes no part in replication.
    Inactive,
    /// A role this client does not know about.
    Unknown(i32),
}

impl PartitionRole {
    /// Human readable role name; anything but leader and follower is "Unknown".
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionRole::Leader => "Leader",
            PartitionRole::Follower => "Follower",
            PartitionRole::Inactive | PartitionRole::Unknown(_) => "Unknown",
        }
    }
}

impl From<i32> for PartitionRole {
    fn from(role: i32) -> Self {
        use proto::partition::PartitionBrokerRole;

        match PartitionBrokerRole::try_from(role) {
            Ok(PartitionBrokerRole::Leader) => PartitionRole::Leader,
            Ok(PartitionBrokerRole::Follower) => PartitionRole::Follower,
            Ok(PartitionBrokerRole::Inactive) => PartitionRole::Inactive,
            Err(_) => PartitionRole::Unknown(role),
        }
    }
}

impl fmt::Display for PartitionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
