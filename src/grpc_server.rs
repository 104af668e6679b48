//! gRPC server implementation using Tonic.

use crate::error::EngineError;
use crate::grid::{self, Grid};
use crate::simulation::{self, Agent};
use crate::state::AppState;
use std::net::SocketAddr;
use tonic::{Request, Response, Status};
use tracing::info;

// Import generated protobuf types
pub mod proto {
    tonic::include_proto!("evacgrid");
}

use proto::grid_service_server::{GridService, GridServiceServer};
use proto::{
    BlockCellRequest, GetGridRequest, GridResponse, ListMapsRequest, ListMapsResponse,
    RunSimulationRequest, RunSimulationResponse,
};

/// gRPC service implementation.
pub struct GridServiceImpl {
    state: AppState,
}

impl GridServiceImpl {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

fn status(err: EngineError) -> Status {
    match err {
        EngineError::UnknownMap { .. } | EngineError::InvalidSession { .. } => {
            Status::not_found(err.to_string())
        }
        EngineError::OutOfBounds { .. } => Status::invalid_argument(err.to_string()),
        EngineError::Worker(_) => Status::internal(err.to_string()),
    }
}

fn session(id: &str) -> Option<&str> {
    (!id.is_empty()).then_some(id)
}

impl From<grid::Point> for proto::Point {
    fn from(p: grid::Point) -> Self {
        Self { x: p.x, y: p.y }
    }
}

impl From<proto::Point> for grid::Point {
    fn from(p: proto::Point) -> Self {
        Self::new(p.x, p.y)
    }
}

impl From<&Grid> for proto::Grid {
    fn from(grid: &Grid) -> Self {
        Self {
            width: grid.width() as u32,
            height: grid.height() as u32,
            cells: grid.to_bytes(),
        }
    }
}

fn point_field(point: Option<proto::Point>, field: &str) -> Result<grid::Point, Status> {
    point
        .map(Into::into)
        .ok_or_else(|| Status::invalid_argument(format!("missing {field}")))
}

fn path_result(result: simulation::PathResult) -> proto::PathResult {
    let (error_kind, error) = match &result.error {
        Some(e) => (e.kind().to_string(), e.to_string()),
        None => (String::new(), String::new()),
    };
    proto::PathResult {
        agent_id: result.agent_id,
        start: Some(result.start.into()),
        end: Some(result.end.into()),
        steps: result.steps as u32,
        path: result.path.into_iter().map(Into::into).collect(),
        error_kind,
        error,
    }
}

#[tonic::async_trait]
impl GridService for GridServiceImpl {
    async fn list_maps(
        &self,
        _request: Request<ListMapsRequest>,
    ) -> Result<Response<ListMapsResponse>, Status> {
        Ok(Response::new(ListMapsResponse {
            maps: self.state.engine.list_maps(),
        }))
    }

    async fn get_grid(
        &self,
        request: Request<GetGridRequest>,
    ) -> Result<Response<GridResponse>, Status> {
        let req = request.into_inner();
        let grid = self
            .state
            .engine
            .get_grid(&req.map_name, session(&req.session_id))
            .await
            .map_err(status)?;

        Ok(Response::new(GridResponse {
            map_name: req.map_name,
            session_id: req.session_id,
            grid: Some(grid.as_ref().into()),
        }))
    }

    async fn block_cell(
        &self,
        request: Request<BlockCellRequest>,
    ) -> Result<Response<GridResponse>, Status> {
        let req = request.into_inner();
        info!("gRPC BlockCell: map={}, session={}", req.map_name, req.session_id);
        if req.session_id.is_empty() {
            return Err(Status::invalid_argument("missing session_id"));
        }
        let point = point_field(req.block, "block")?;

        let grid = self
            .state
            .engine
            .block_cell(&req.map_name, &req.session_id, point.x, point.y)
            .await
            .map_err(status)?;

        Ok(Response::new(GridResponse {
            map_name: req.map_name,
            session_id: req.session_id,
            grid: Some(grid.as_ref().into()),
        }))
    }

    async fn run_simulation(
        &self,
        request: Request<RunSimulationRequest>,
    ) -> Result<Response<RunSimulationResponse>, Status> {
        let req = request.into_inner();
        info!("gRPC RunSimulation: map={}, agents={}", req.map_name, req.agents.len());

        let agents = req
            .agents
            .into_iter()
            .map(|a| -> Result<Agent, Status> {
                let agent = Agent::new(point_field(a.start, "start")?, point_field(a.end, "end")?);
                Ok(if a.id > 0 { agent.with_id(a.id) } else { agent })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let total_agents = agents.len() as u32;

        let report = self
            .state
            .engine
            .run_simulation(&req.map_name, session(&req.session_id), agents)
            .await
            .map_err(status)?;

        let congestion = &report.congestion_grid;
        Ok(Response::new(RunSimulationResponse {
            map_name: req.map_name,
            total_agents,
            width: congestion.width() as u32,
            height: congestion.height() as u32,
            congestion: congestion.counts().to_vec(),
            results: report.results.into_iter().map(path_result).collect(),
        }))
    }
}

/// Run the gRPC server on the given port with the provided state.
pub async fn run_server(port: u16, state: AppState) -> Result<(), tonic::transport::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting gRPC server on {}", addr);

    let service = GridServiceImpl::new(state);

    tonic::transport::Server::builder()
        .add_service(GridServiceServer::new(service))
        .serve(addr)
        .await
}
