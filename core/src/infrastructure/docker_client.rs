// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Stops Docker Compose stacks whose volumes live on a pool that has
//! gone down, so containers don't keep writing to a dead mount
//! (spec §4.4).

use bollard::query_parameters::{ListContainersOptionsBuilder, StopContainerOptionsBuilder};
use bollard::Docker;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum DockerClientError {
    #[error("failed to connect to Docker: {0}")]
    Connect(bollard::errors::Error),
    #[error("failed to list containers: {0}")]
    List(bollard::errors::Error),
    #[error("failed to stop container {id}: {source}")]
    Stop { id: String, source: bollard::errors::Error },
}

pub struct DockerClient {
    docker: Docker,
}

#[derive(Debug, Clone)]
pub struct StoppedContainer {
    pub id: String,
    pub names: Vec<String>,
}

impl DockerClient {
    pub fn connect() -> Result<Self, DockerClientError> {
        let docker = Docker::connect_with_local_defaults().map_err(DockerClientError::Connect)?;
        Ok(Self { docker })
    }

    pub async fn healthcheck(&self) -> Result<(), DockerClientError> {
        self.docker.ping().await.map_err(DockerClientError::Connect)?;
        Ok(())
    }

    /// Stops every running container whose bind mounts reference
    /// `mount_point` (or a path beneath it). Best-effort: a container
    /// that fails to stop is logged and skipped so the rest still go
    /// down.
    pub async fn stop_containers_bound_to(
        &self,
        mount_point: &str,
    ) -> Result<Vec<StoppedContainer>, DockerClientError> {
        let mut filters = HashMap::new();
        filters.insert("status".to_string(), vec!["running".to_string()]);
        let options = ListContainersOptionsBuilder::new().all(false).filters(&filters).build();

        let containers = self.docker.list_containers(Some(options)).await.map_err(DockerClientError::List)?;

        let mut stopped = Vec::new();
        for container in containers {
            let Some(id) = container.id.clone() else { continue };
            let binds_here = container
                .mounts
                .as_ref()
                .map(|mounts| {
                    mounts.iter().any(|m| {
                        m.source.as_deref().is_some_and(|src| src == mount_point || src.starts_with(&format!("{mount_point}/")))
                    })
                })
                .unwrap_or(false);
            if !binds_here {
                continue;
            }

            let stop_options = StopContainerOptionsBuilder::new().t(10).build();
            match self.docker.stop_container(&id, Some(stop_options)).await {
                Ok(()) => {
                    tracing::warn!(container_id = %id, mount_point, "stopped container bound to failed pool");
                    stopped.push(StoppedContainer { id, names: container.names.unwrap_or_default() });
                }
                Err(source) => {
                    tracing::error!(container_id = %id, error = %source, "failed to stop container on pool failure");
                }
            }
        }
        Ok(stopped)
    }
}
