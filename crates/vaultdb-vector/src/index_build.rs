//! IVF_PQ training for large semantic tables.

use anyhow::Result;
use lancedb::index::{vector::IvfPqIndexBuilder, Index};
use lancedb::{DistanceType, Table};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfPqParams {
    pub nlist: usize,
    pub m: usize,
    pub nbits: usize,
}

/// Partition count grows with sqrt(rows); sub-vector count must divide `dim`.
pub fn compute_ivfpq_params(rows: usize, dim: usize) -> IvfPqParams {
    let sqrt_n = (rows as f64).sqrt() as usize;
    let mut nlist = sqrt_n.clamp(1, 4096);
    if rows > 1 {
        nlist = nlist.min(rows - 1);
    } else {
        nlist = 1;
    }
    let preferred = if dim >= 1024 { 32 } else { 16 };
    let m = [preferred, 16, 8, 4, 2, 1]
        .into_iter()
        .find(|m| *m <= dim && dim % m == 0)
        .unwrap_or(1);
    IvfPqParams { nlist, m, nbits: 8 }
}

pub async fn build_ivfpq_index(table: &Table, params: &IvfPqParams) -> Result<()> {
    info!(nlist = params.nlist, m = params.m, "training IVF_PQ index");
    table
        .create_index(
            &["vector"],
            Index::IvfPq(
                IvfPqIndexBuilder::default()
                    .distance_type(DistanceType::Cosine)
                    .num_partitions(params.nlist as u32)
                    .num_sub_vectors(params.m as u32),
            ),
        )
        .execute()
        .await?;
    Ok(())
}
