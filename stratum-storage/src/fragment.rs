use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use itertools::Itertools;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stratum_error::{stratum_bail, stratum_err, StratumResult};
use stratum_filter::FilterPipeline;
use stratum_layout::{linearize, CoordKeys, CoordMapper, DenseLayout, RangeIter};
use stratum_schema::{ArrayKind, ArraySchema, Attribute};

/// Directory under an array holding its fragments.
pub const FRAGMENTS_DIR: &str = "__fragments";
/// Serialized schema file inside an array directory.
pub const SCHEMA_FILE: &str = "__schema";
/// Fragment metadata file.
pub const META_FILE: &str = "__meta";
/// Completion marker, written last; fragments without it are invisible.
pub const SEALED_FILE: &str = "__sealed";
/// Coordinate tile payload file (sparse fragments).
pub const COORDS_FILE: &str = "__coords.data";

/// Location of one filtered tile payload inside an attribute's data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileEntry {
    /// Byte offset into the data file.
    pub offset: u64,
    /// Filtered payload length in bytes.
    pub len: u64,
    /// Payload length before filtering, cross-checked on decode.
    pub raw_len: u64,
    /// Number of cells in the tile.
    pub cells: u64,
}

/// Metadata for one sealed fragment: its timestamp, the tiles it holds, and where
/// each filtered payload lives. Serialized as flexbuffers into [`META_FILE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentMeta {
    /// Fragment directory name.
    pub id: String,
    /// Creation timestamp; strictly increasing across an array's fragments.
    pub timestamp: u64,
    /// How the fragment stores its cells: positional over a subarray (dense) or
    /// coordinate-keyed (sparse). Dense arrays take sparse fragments too, for
    /// scattered updates.
    pub kind: ArrayKind,
    /// Normalized subarray this fragment covers (dense fragments only).
    pub dense_ranges: Option<Vec<(u64, u64)>>,
    /// Global tile ids (dense) or run indices (sparse), parallel to the tile indexes.
    pub tile_ids: Vec<u64>,
    /// Per-tile bounding boxes over normalized coordinates (sparse fragments only).
    pub tile_mbrs: Vec<Vec<(u64, u64)>>,
    /// Total cells in the fragment.
    pub cell_count: u64,
    /// Per-attribute tile index, keyed by attribute name.
    pub attr_tiles: BTreeMap<String, Vec<TileEntry>>,
    /// Coordinate tile index (sparse fragments only).
    pub coords_tiles: Vec<TileEntry>,
}

/// The cells of one write, already validated and ordered, ready to be tiled.
#[derive(Debug)]
pub enum FragmentInput {
    /// A tile-aligned dense write: columns enumerate `ranges` in cell order.
    Dense {
        /// Normalized, tile-aligned subarray being written.
        ranges: Vec<(u64, u64)>,
        /// One column per schema attribute.
        attrs: Vec<crate::AttrData>,
    },
    /// A sparse write, sorted by cell order with duplicates resolved.
    Sparse {
        /// Normalized coordinates, ascending in cell order.
        coords: Vec<CoordKeys>,
        /// One column per schema attribute.
        attrs: Vec<crate::AttrData>,
    },
}

/// Write and seal a fragment under `array_dir`, returning its metadata.
///
/// Tiles are encoded through each attribute's filter pipeline in parallel; payloads
/// and the tile index are written and synced before the completion marker, so an I/O
/// failure at any point leaves an unsealed, invisible fragment.
pub fn write_fragment(
    array_dir: &Path,
    schema: &ArraySchema,
    input: FragmentInput,
    timestamp: u64,
) -> StratumResult<FragmentMeta> {
    let id = format!("{timestamp:020}_{}", uuid::Uuid::new_v4().simple());
    let dir = array_dir.join(FRAGMENTS_DIR).join(&id);
    fs::create_dir_all(&dir)?;
    log::debug!(
        "writing fragment {id} for array '{}' at timestamp {timestamp}",
        schema.name()
    );

    // Per-tile source cell indices into the batch, plus identity metadata.
    let (tile_ids, tile_cells, dense_ranges, attrs, coords) = match input {
        FragmentInput::Dense { ranges, attrs } => {
            let layout = DenseLayout::new(schema)?;
            if !layout.is_tile_aligned(&ranges) {
                stratum_bail!(
                    "dense writes must target tile-aligned subarrays, got {ranges:?}"
                );
            }
            let sizes = ranges.iter().map(|(lo, hi)| hi - lo + 1).collect_vec();
            let tile_ids = layout.tiles_covering(&ranges)?;
            let mut tile_cells = Vec::with_capacity(tile_ids.len());
            for tile_id in &tile_ids {
                let tile_ranges = layout.tile_ranges(*tile_id)?;
                let mut sources = Vec::with_capacity(layout.tile_cells() as usize);
                for coord in RangeIter::new(&tile_ranges, schema.cell_order())? {
                    let rel = coord
                        .iter()
                        .zip(&ranges)
                        .map(|(c, (lo, _))| c - lo)
                        .collect_vec();
                    sources.push(linearize(&rel, &sizes, schema.cell_order())? as usize);
                }
                tile_cells.push(sources);
            }
            (tile_ids, tile_cells, Some(ranges), attrs, None)
        }
        FragmentInput::Sparse { coords, attrs } => {
            let capacity = match schema.kind() {
                ArrayKind::Sparse => schema.sparse_capacity()? as usize,
                ArrayKind::Dense => DenseLayout::new(schema)?.tile_cells() as usize,
            };
            let sources = (0..coords.len()).collect_vec();
            let tile_cells = sources
                .chunks(capacity)
                .map(<[usize]>::to_vec)
                .collect_vec();
            let tile_ids = (0..tile_cells.len() as u64).collect_vec();
            (tile_ids, tile_cells, None, attrs, Some(coords))
        }
    };

    let cell_count = tile_cells.iter().map(Vec::len).sum::<usize>() as u64;
    let mut meta = FragmentMeta {
        id: id.clone(),
        timestamp,
        kind: if coords.is_some() {
            ArrayKind::Sparse
        } else {
            ArrayKind::Dense
        },
        dense_ranges,
        tile_ids,
        tile_mbrs: Vec::new(),
        cell_count,
        attr_tiles: BTreeMap::new(),
        coords_tiles: Vec::new(),
    };

    // Attribute payloads, one data file per attribute.
    for (attr, data) in schema.attributes().iter().zip(&attrs) {
        let pipeline = attr.pipeline()?;
        let encoded = encode_tiles(&tile_cells, &pipeline, |sources| {
            data.gather(sources, attr.cell_size()).tile_payload()
        })?;
        let entries = write_data_file(&dir, &attr_file(attr), &tile_cells, encoded)?;
        meta.attr_tiles.insert(attr.name().to_string(), entries);
    }

    // Coordinate payloads and bounding boxes for sparse fragments.
    if let Some(coords) = &coords {
        let mapper = CoordMapper::new(schema)?;
        let pipeline = schema.coords_pipeline()?;
        meta.tile_mbrs = tile_cells
            .iter()
            .map(|sources| tile_mbr(coords, sources, schema.ndim()))
            .collect();
        let encoded = encode_tiles(&tile_cells, &pipeline, |sources| {
            let tuples = sources.iter().map(|i| coords[*i].clone()).collect_vec();
            mapper.keys_to_bytes(&tuples)
        })?;
        meta.coords_tiles = write_data_file(&dir, COORDS_FILE, &tile_cells, encoded)?;
    }

    // Seal: metadata, then the completion marker, each synced. Readers only see the
    // fragment once the marker exists.
    let mut ser = flexbuffers::FlexbufferSerializer::new();
    meta.serialize(&mut ser)?;
    let mut meta_file = File::create(dir.join(META_FILE))?;
    meta_file.write_all(ser.view())?;
    meta_file.sync_all()?;
    File::create(dir.join(SEALED_FILE))?.sync_all()?;
    log::debug!("sealed fragment {id} ({cell_count} cells)");
    Ok(meta)
}

fn attr_file(attr: &Attribute) -> String {
    format!("{}.data", attr.name())
}

fn encode_tiles(
    tile_cells: &[Vec<usize>],
    pipeline: &FilterPipeline,
    payload: impl Fn(&[usize]) -> Vec<u8> + Sync,
) -> StratumResult<Vec<(u64, Vec<u8>)>> {
    tile_cells
        .par_iter()
        .map(|sources| {
            let raw = payload(sources);
            let filtered = pipeline.apply(&raw)?;
            Ok((raw.len() as u64, filtered))
        })
        .collect()
}

fn write_data_file(
    dir: &Path,
    name: &str,
    tile_cells: &[Vec<usize>],
    encoded: Vec<(u64, Vec<u8>)>,
) -> StratumResult<Vec<TileEntry>> {
    let mut entries = Vec::with_capacity(encoded.len());
    let mut offset = 0u64;
    let mut file = File::create(dir.join(name))?;
    for ((raw_len, payload), sources) in encoded.iter().zip(tile_cells) {
        file.write_all(payload)?;
        entries.push(TileEntry {
            offset,
            len: payload.len() as u64,
            raw_len: *raw_len,
            cells: sources.len() as u64,
        });
        offset += payload.len() as u64;
    }
    file.sync_all()?;
    Ok(entries)
}

fn tile_mbr(coords: &[CoordKeys], sources: &[usize], ndim: usize) -> Vec<(u64, u64)> {
    let mut mbr = vec![(u64::MAX, 0u64); ndim];
    for i in sources {
        for (dim, key) in coords[*i].iter().enumerate() {
            mbr[dim].0 = mbr[dim].0.min(*key);
            mbr[dim].1 = mbr[dim].1.max(*key);
        }
    }
    mbr
}

/// Read-only access to one sealed fragment.
#[derive(Debug, Clone)]
pub struct FragmentReader {
    dir: PathBuf,
    meta: FragmentMeta,
}

impl FragmentReader {
    /// Open a sealed fragment by directory name; unsealed fragments are treated as
    /// absent, never repaired.
    pub fn open(array_dir: &Path, id: &str) -> StratumResult<Self> {
        let dir = array_dir.join(FRAGMENTS_DIR).join(id);
        if !dir.join(SEALED_FILE).exists() {
            stratum_bail!(NotFound: "fragment '{id}' is not sealed");
        }
        let bytes = fs::read(dir.join(META_FILE))?;
        let reader = flexbuffers::Reader::get_root(bytes.as_slice())?;
        let meta = FragmentMeta::deserialize(reader)?;
        if meta.id != id {
            stratum_bail!(
                CorruptData: "fragment '{id}' metadata names itself '{}'",
                meta.id
            );
        }
        Ok(Self { dir, meta })
    }

    /// The fragment's metadata.
    pub fn meta(&self) -> &FragmentMeta {
        &self.meta
    }

    /// Decode one attribute tile back to raw cells.
    pub fn read_attr_tile(&self, attr: &Attribute, tile_pos: usize) -> StratumResult<crate::AttrData> {
        let entries = self.meta.attr_tiles.get(attr.name()).ok_or_else(|| {
            stratum_err!(
                NotFound: "fragment '{}' has no tiles for attribute '{}'",
                self.meta.id,
                attr.name()
            )
        })?;
        let entry = tile_entry(entries, tile_pos, &self.meta.id)?;
        let raw = self.read_raw(&attr_file(attr), entry, &attr.pipeline()?)?;
        let data = crate::AttrData::from_tile_payload(attr.is_var_sized(), &raw)?;
        if data.cell_count(attr.cell_size()) != entry.cells {
            stratum_bail!(
                CorruptData: "tile {tile_pos} of attribute '{}' decoded to {} cells, index says {}",
                attr.name(),
                data.cell_count(attr.cell_size()),
                entry.cells
            );
        }
        Ok(data)
    }

    /// Decode one coordinate tile back to normalized key tuples.
    pub fn read_coords_tile(
        &self,
        schema: &ArraySchema,
        tile_pos: usize,
    ) -> StratumResult<Vec<CoordKeys>> {
        let entry = tile_entry(&self.meta.coords_tiles, tile_pos, &self.meta.id)?;
        let raw = self.read_raw(COORDS_FILE, entry, &schema.coords_pipeline()?)?;
        CoordMapper::new(schema)?.keys_from_bytes(&raw)
    }

    /// Read one filtered payload and reverse it, cross-checking the unfiltered
    /// length recorded in the tile index.
    fn read_raw(
        &self,
        name: &str,
        entry: TileEntry,
        pipeline: &FilterPipeline,
    ) -> StratumResult<Vec<u8>> {
        let mut file = File::open(self.dir.join(name))?;
        file.seek(SeekFrom::Start(entry.offset))?;
        let mut buf = vec![0u8; entry.len as usize];
        file.read_exact(&mut buf)?;
        let raw = pipeline.reverse(&buf)?;
        if raw.len() as u64 != entry.raw_len {
            stratum_bail!(
                CorruptData: "tile in '{name}' of fragment '{}' reversed to {} bytes, index says {}",
                self.meta.id,
                raw.len(),
                entry.raw_len
            );
        }
        Ok(raw)
    }
}

fn tile_entry(entries: &[TileEntry], tile_pos: usize, id: &str) -> StratumResult<TileEntry> {
    entries.get(tile_pos).copied().ok_or_else(|| {
        stratum_err!(
            NotFound: "fragment '{id}' has {} tiles, tile {tile_pos} requested",
            entries.len()
        )
    })
}
