//! Application layer wiring DTOs and services for EDITH.

pub mod dtos;
pub mod services;

pub use dtos::{
    HealthStatusResponse, IndexStatsResponse, IngestReport, NoteAnalysis, QueryRequest,
    SummaryRequest, SummaryResponse,
};
pub use services::{AssistantConfig, NotesAssistant};
