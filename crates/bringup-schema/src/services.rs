use serde::Serialize;

/// One of the fixed containerized services installed on the appliance.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub image: &'static str,
    /// `host:container` port mappings.
    pub ports: &'static [&'static str],
    /// Mount point of the service data directory inside the container.
    pub data_mount: &'static str,
    pub environment: &'static [(&'static str, &'static str)],
}

pub const BUILTIN_SERVICES: &[ServiceSpec] = &[
    ServiceSpec {
        name: "node-red",
        description: "Flow-based automation runtime",
        image: "nodered/node-red:3.1",
        ports: &["1880:1880"],
        data_mount: "/data",
        environment: &[("TZ", "UTC")],
    },
    ServiceSpec {
        name: "mosquitto",
        description: "MQTT broker",
        image: "eclipse-mosquitto:2.0",
        ports: &["1883:1883", "9001:9001"],
        data_mount: "/mosquitto/data",
        environment: &[],
    },
    ServiceSpec {
        name: "influxdb",
        description: "Time series database",
        image: "influxdb:2.7",
        ports: &["8086:8086"],
        data_mount: "/var/lib/influxdb2",
        environment: &[("DOCKER_INFLUXDB_INIT_MODE", "setup")],
    },
];

pub fn get_service(name: &str) -> Option<&'static ServiceSpec> {
    BUILTIN_SERVICES.iter().find(|s| s.name == name)
}

pub fn list_services() -> &'static [ServiceSpec] {
    BUILTIN_SERVICES
}

impl ServiceSpec {
    /// Container name used for `docker ps` filters and compose `container_name`.
    pub fn container_name(&self) -> String {
        format!("bringup-{}", self.name)
    }

    pub fn service_dir(&self, root: &str) -> String {
        format!("{}/{}", root.trim_end_matches('/'), self.name)
    }

    pub fn data_dir(&self, root: &str) -> String {
        format!("{}/data", self.service_dir(root))
    }

    pub fn descriptor_path(&self, root: &str) -> String {
        format!("{}/compose.json", self.service_dir(root))
    }

    /// Render the declarative service descriptor. Compose reads JSON as
    /// YAML, so the descriptor is emitted with serde_json.
    pub fn render_descriptor(&self, root: &str) -> Result<String, serde_json::Error> {
        let environment: serde_json::Map<String, serde_json::Value> = self
            .environment
            .iter()
            .map(|(k, v)| ((*k).to_owned(), serde_json::Value::from(*v)))
            .collect();
        let doc = serde_json::json!({
            "services": {
                self.name: {
                    "image": self.image,
                    "container_name": self.container_name(),
                    "restart": "unless-stopped",
                    "ports": self.ports,
                    "volumes": [format!("{}:{}", self.data_dir(root), self.data_mount)],
                    "environment": environment,
                }
            }
        });
        serde_json::to_string_pretty(&doc)
    }
}
