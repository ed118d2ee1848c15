use crate::config::{IndexMeta, MatrixConfig};
use crate::error::{IndexError, Result};
use crate::hash::{ElementHasher, estimate_false_positive_rate};
use crate::matrix::{BitMatrix, BloomBits};
use crate::row::{ColourSet, concat_rows, mask_padding, row_width};
use crate::snapshot::{SnapshotHeader, read_names, write_names};
use crate::storage::{InMemoryRowStore, RowStore};
use bitvec::{bitvec, order::Lsb0};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parses a textual colour id. Negative and non-numeric ids are rejected.
pub fn parse_colour(text: &str) -> Result<usize> {
    let value: i64 = text.trim().parse().map_err(|_| {
        IndexError::InvalidColour(format!("'{text}' is not an integer"))
    })?;
    usize::try_from(value).map_err(|_| {
        IndexError::InvalidColour(format!("{value} is negative"))
    })
}

/// One colour matched by [`ProbabilisticIndex::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub colour: usize,
    pub name: Option<String>,
    /// Fraction of query elements present in this colour
    pub fraction: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub size: usize,
    pub num_hashes: usize,
    pub num_colours: usize,
    pub named_colours: usize,
    pub row_width: usize,
    pub hasher: &'static str,
}

/// A bit matrix bound to its row store, plus the colour name registry.
///
/// The index is open from construction until [`close`](Self::close). Every
/// row-touching operation on a closed index fails with
/// [`IndexError::NotOpen`].
pub struct ProbabilisticIndex<S: RowStore> {
    matrix: Option<BitMatrix<S>>,
    config: MatrixConfig,
    colour_names: Vec<Option<String>>,
    colours_by_name: HashMap<String, usize>,
}

pub type InMemoryIndex = ProbabilisticIndex<InMemoryRowStore>;

impl InMemoryIndex {
    pub fn in_memory(config: MatrixConfig) -> Result<Self> {
        Self::open(InMemoryRowStore::new(), Some(config))
    }
}

impl<S: RowStore> ProbabilisticIndex<S> {
    /// Opens an index over `store`.
    ///
    /// If the store already holds index metadata, that metadata is used and
    /// `config` is only checked for compatibility. A fresh store requires
    /// `config`, which is written to the store.
    pub fn open(store: S, config: Option<MatrixConfig>) -> Result<Self> {
        Self::open_inner(store, config, None)
    }

    /// Like [`open`](Self::open) but hashes with `hasher` instead of the
    /// strategy named in the configuration.
    pub fn open_with_hasher(
        store: S,
        config: Option<MatrixConfig>,
        hasher: Arc<dyn ElementHasher>,
    ) -> Result<Self> {
        Self::open_inner(store, config, Some(hasher))
    }

    fn open_inner(
        store: S,
        config: Option<MatrixConfig>,
        hasher: Option<Arc<dyn ElementHasher>>,
    ) -> Result<Self> {
        let stored = match store.load_meta()? {
            Some(bytes) => Some(IndexMeta::from_bytes(&bytes)?),
            None => None,
        };

        let (config, num_colours, colour_names, fresh) = match stored {
            Some(meta) => {
                if let Some(requested) = &config
                    && !requested.is_compatible(&meta.config)
                {
                    warn!(
                        stored_size = meta.config.size,
                        stored_hashes = meta.config.num_hashes,
                        "ignoring requested configuration, \
                         store already holds an index"
                    );
                }
                (meta.config, meta.num_colours, meta.colour_names, false)
            }
            None => {
                let config = config.ok_or_else(|| {
                    IndexError::InvalidConfig(
                        "Configuration required for new index".to_string(),
                    )
                })?;
                let num_colours = config.num_colours;
                (config, num_colours, Vec::new(), true)
            }
        };

        let matrix = match hasher {
            Some(hasher) => BitMatrix::with_hasher(store, &config, hasher)?,
            None => BitMatrix::new(store, &config)?,
        };
        matrix.grow_colours(num_colours);

        let colours_by_name = colour_names
            .iter()
            .enumerate()
            .filter_map(|(colour, name)| {
                name.clone().map(|name| (name, colour))
            })
            .collect();

        let mut index = Self {
            matrix: Some(matrix),
            config,
            colour_names,
            colours_by_name,
        };

        if fresh {
            index.persist_meta()?;
        }

        info!(
            size = index.config.size,
            num_hashes = index.config.num_hashes,
            num_colours,
            fresh,
            "opened index"
        );
        Ok(index)
    }

    pub fn is_open(&self) -> bool {
        self.matrix.is_some()
    }

    /// Saves metadata, flushes and releases the row store. Closing an
    /// already closed index does nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.matrix.is_none() {
            return Ok(());
        }
        self.persist_meta()?;
        if let Some(mut matrix) = self.matrix.take() {
            matrix.store_mut().flush()?;
        }
        debug!("closed index");
        Ok(())
    }

    /// Closes the index and hands back its row store.
    pub fn into_store(mut self) -> Result<S> {
        self.persist_meta()?;
        let mut matrix = self.matrix.take().ok_or(IndexError::NotOpen)?;
        matrix.store_mut().flush()?;
        Ok(matrix.into_store())
    }

    fn matrix(&self) -> Result<&BitMatrix<S>> {
        self.matrix.as_ref().ok_or(IndexError::NotOpen)
    }

    fn matrix_mut(&mut self) -> Result<&mut BitMatrix<S>> {
        self.matrix.as_mut().ok_or(IndexError::NotOpen)
    }

    fn meta(&self) -> Result<IndexMeta> {
        Ok(IndexMeta {
            config: self.config.clone(),
            num_colours: self.matrix()?.num_colours(),
            colour_names: self.colour_names.clone(),
        })
    }

    fn persist_meta(&mut self) -> Result<()> {
        let bytes = self.meta()?.to_bytes()?;
        self.matrix_mut()?.store_mut().save_meta(&bytes)
    }

    fn validate_colour(&self, colour: usize) -> Result<()> {
        if colour >= self.config.max_colours {
            return Err(IndexError::InvalidColour(format!(
                "{colour} is not below the limit of {} colours",
                self.config.max_colours
            )));
        }
        Ok(())
    }

    pub fn config(&self) -> &MatrixConfig {
        &self.config
    }

    pub fn num_colours(&self) -> Result<usize> {
        Ok(self.matrix()?.num_colours())
    }

    pub fn hashes(&self, element: &[u8]) -> Result<Vec<usize>> {
        Ok(self.matrix()?.hashes(element))
    }

    /// Builds a single Bloom filter of the matrix's size from `elements`.
    pub fn create_bloom_filter<E: AsRef<[u8]>>(
        &self,
        elements: &[E],
    ) -> Result<BloomBits> {
        let matrix = self.matrix()?;
        let mut bloom = bitvec![usize, Lsb0; 0; matrix.size()];
        for element in elements {
            for row in matrix.hashes(element.as_ref()) {
                bloom.set(row, true);
            }
        }
        Ok(bloom)
    }

    /// ORs `bloom` into colour `colour`, widening the matrix if needed.
    pub fn insert(&mut self, bloom: &BloomBits, colour: usize) -> Result<()> {
        self.validate_colour(colour)?;
        let matrix = self.matrix_mut()?;
        let grows = colour >= matrix.num_colours();
        matrix.add_column(bloom, colour)?;
        if grows {
            self.persist_meta()?;
        }
        Ok(())
    }

    pub fn insert_elements<E: AsRef<[u8]>>(
        &mut self,
        elements: &[E],
        colour: usize,
    ) -> Result<()> {
        let bloom = self.create_bloom_filter(elements)?;
        self.insert(&bloom, colour)
    }

    /// Adds a single element to colour `colour`.
    pub fn add(&mut self, element: &[u8], colour: usize) -> Result<()> {
        self.validate_colour(colour)?;
        let matrix = self.matrix_mut()?;
        let grows = colour >= matrix.num_colours();
        matrix.add(element, colour)?;
        if grows {
            self.persist_meta()?;
        }
        Ok(())
    }

    pub fn contains(&self, element: &[u8], colour: usize) -> Result<bool> {
        self.matrix()?.contains(element, colour)
    }

    pub fn lookup(&self, element: &[u8]) -> Result<ColourSet> {
        self.matrix()?.lookup(element)
    }

    pub fn lookup_all_present<E: AsRef<[u8]>>(
        &self,
        elements: &[E],
    ) -> Result<ColourSet> {
        self.matrix()?.lookup_all_present(elements)
    }

    /// Scores every colour by the fraction of `elements` it contains and
    /// keeps those at or above `threshold`, best first.
    pub fn search<E: AsRef<[u8]>>(
        &self,
        elements: &[E],
        threshold: f64,
    ) -> Result<Vec<SearchHit>> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(IndexError::InvalidThreshold(threshold));
        }
        if elements.is_empty() {
            return Err(IndexError::EmptyQuery);
        }
        let matrix = self.matrix()?;
        let mut counts = vec![0usize; matrix.num_colours()];
        for element in elements {
            for colour in matrix.lookup(element.as_ref())?.iter() {
                counts[colour] += 1;
            }
        }

        let total = elements.len() as f64;
        let mut hits: Vec<SearchHit> = counts
            .into_iter()
            .enumerate()
            .filter_map(|(colour, count)| {
                let fraction = count as f64 / total;
                (count > 0 && fraction >= threshold).then(|| SearchHit {
                    colour,
                    name: self.colour_name(colour).map(str::to_string),
                    fraction,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.fraction
                .total_cmp(&a.fraction)
                .then(a.colour.cmp(&b.colour))
        });

        debug!(
            elements = elements.len(),
            threshold,
            hits = hits.len(),
            "search"
        );
        Ok(hits)
    }

    pub fn get_column(&self, colour: usize) -> Result<BloomBits> {
        self.matrix()?.get_column(colour)
    }

    /// Returns the colour registered under `name`, assigning the next free
    /// colour id to a new name.
    pub fn register_colour(&mut self, name: &str) -> Result<usize> {
        if let Some(&colour) = self.colours_by_name.get(name) {
            return Ok(colour);
        }
        let colour = self.matrix()?.num_colours().max(self.colour_names.len());
        self.validate_colour(colour)?;
        self.matrix()?.grow_colours(colour + 1);
        self.set_colour_name(colour, name.to_string());
        self.persist_meta()?;
        debug!(colour, name, "registered colour");
        Ok(colour)
    }

    pub fn insert_named(
        &mut self,
        name: &str,
        bloom: &BloomBits,
    ) -> Result<usize> {
        let colour = self.register_colour(name)?;
        self.insert(bloom, colour)?;
        Ok(colour)
    }

    pub fn colour_of(&self, name: &str) -> Option<usize> {
        self.colours_by_name.get(name).copied()
    }

    pub fn colour_name(&self, colour: usize) -> Option<&str> {
        self.colour_names.get(colour).and_then(|name| name.as_deref())
    }

    /// `(colour, name)` pairs for every colour in `set`.
    pub fn names_for<'a>(
        &'a self,
        set: &'a ColourSet,
    ) -> impl Iterator<Item = (usize, Option<&'a str>)> + 'a {
        set.iter().map(move |colour| (colour, self.colour_name(colour)))
    }

    fn set_colour_name(&mut self, colour: usize, name: String) {
        if self.colour_names.len() <= colour {
            self.colour_names.resize(colour + 1, None);
        }
        if let Some(old) = self.colour_names[colour].take() {
            self.colours_by_name.remove(&old);
        }
        self.colours_by_name.insert(name.clone(), colour);
        self.colour_names[colour] = Some(name);
    }

    /// Clears a colour's bits from every row and forgets its name. The id is
    /// not reused. Returns the number of bits cleared.
    pub fn remove_colour(&mut self, colour: usize) -> Result<usize> {
        let num_colours = self.matrix()?.num_colours();
        if colour >= num_colours {
            return Err(IndexError::InvalidColour(format!(
                "{colour} is not one of the {num_colours} colours"
            )));
        }
        let cleared = self.matrix_mut()?.clear_column(colour)?;
        if let Some(name) =
            self.colour_names.get_mut(colour).and_then(Option::take)
        {
            self.colours_by_name.remove(&name);
        }
        self.persist_meta()?;
        info!(colour, cleared, "removed colour");
        Ok(cleared)
    }

    /// Writes all rows in order as fixed-width records of
    /// `ceil(num_colours / 8)` bytes, with no header. Returns the number of
    /// records written.
    pub fn dump<W: Write>(&self, mut sink: W) -> Result<usize> {
        let matrix = self.matrix()?;
        let size = matrix.size();
        let batch = matrix.batch_size();

        let mut written = 0;
        let mut start = 0;
        while start < size {
            let end = (start + batch).min(size);
            for row in matrix.read_rows(start, end)? {
                sink.write_all(&row)?;
            }
            written += end - start;
            start = end;
        }
        sink.flush()?;

        info!(rows = written, width = matrix.row_width(), "dumped matrix");
        Ok(written)
    }

    /// Reads `size` records of `ceil(num_colours / 8)` bytes and writes them
    /// over the rows with matching indices. Returns the number of records read.
    ///
    /// Records are written in batches as they are read, so a truncated input
    /// fails with an I/O error after the earlier batches have been written.
    /// Bits past `num_colours` in a record's last byte are dropped.
    pub fn load<R: Read>(
        &mut self,
        source: R,
        num_colours: usize,
    ) -> Result<usize> {
        let size = self.read_records(source, num_colours)?;
        self.persist_meta()?;
        info!(rows = size, num_colours, "loaded matrix");
        Ok(size)
    }

    fn read_records<R: Read>(
        &mut self,
        mut source: R,
        num_colours: usize,
    ) -> Result<usize> {
        if num_colours > self.config.max_colours {
            return Err(IndexError::InvalidColour(format!(
                "{num_colours} colours exceed the limit of {}",
                self.config.max_colours
            )));
        }
        let width = row_width(num_colours);
        let matrix = self.matrix_mut()?;
        matrix.grow_colours(num_colours);

        let size = matrix.size();
        let batch = matrix.batch_size();
        if width == 0 {
            debug!("nothing to load for zero colours");
            return Ok(0);
        }

        let mut rows = Vec::with_capacity(batch.min(size));
        for row in 0..size {
            let mut record = vec![0u8; width];
            source.read_exact(&mut record)?;
            mask_padding(&mut record, num_colours);
            rows.push((row, record));
            if rows.len() == batch {
                matrix.write_rows(&rows)?;
                rows.clear();
            }
        }
        if !rows.is_empty() {
            matrix.write_rows(&rows)?;
        }
        Ok(size)
    }

    /// Writes a self-describing snapshot: header, colour names, then the
    /// same records as [`dump`](Self::dump).
    pub fn export<W: Write>(&self, mut sink: W) -> Result<usize> {
        let matrix = self.matrix()?;
        let header = SnapshotHeader {
            hash_kind: self.config.hash_kind,
            size: matrix.size(),
            num_hashes: matrix.num_hashes(),
            num_colours: matrix.num_colours(),
        };
        header.write_to(&mut sink)?;
        write_names(&mut sink, &self.colour_names)?;
        self.dump(&mut sink)
    }

    /// Replaces rows and colour names with a snapshot written by
    /// [`export`](Self::export). The name registry is only replaced once
    /// every record has been read.
    pub fn import<R: Read>(&mut self, mut source: R) -> Result<usize> {
        if !self.is_open() {
            return Err(IndexError::NotOpen);
        }
        let header = SnapshotHeader::read_from(&mut source)?;
        if header.size != self.config.size
            || header.num_hashes != self.config.num_hashes
            || header.hash_kind != self.config.hash_kind
        {
            return Err(IndexError::IncompatibleSnapshot(format!(
                "snapshot has size {} with {} {} hashes, \
                 index has size {} with {} {} hashes",
                header.size,
                header.num_hashes,
                header.hash_kind,
                self.config.size,
                self.config.num_hashes,
                self.config.hash_kind,
            )));
        }
        let names = read_names(&mut source)?;
        let rows = self.read_records(&mut source, header.num_colours)?;

        self.colour_names.clear();
        self.colours_by_name.clear();
        for (colour, name) in names.into_iter().enumerate() {
            if let Some(name) = name {
                self.set_colour_name(colour, name);
            }
        }
        self.persist_meta()?;

        info!(rows, num_colours = header.num_colours, "imported snapshot");
        Ok(rows)
    }

    /// Appends every colour of `other` after this index's colours. Both
    /// indexes must hash elements to the same rows. Returns the colour id of
    /// `other`'s colour 0 within this index.
    pub fn merge<T: RowStore>(
        &mut self,
        other: &ProbabilisticIndex<T>,
    ) -> Result<usize> {
        if !self.config.is_compatible(&other.config) {
            return Err(IndexError::InvalidConfig(
                "Cannot merge indexes with different size, hash count \
                 or hash strategy"
                    .to_string(),
            ));
        }
        let other_matrix = other.matrix()?;
        let other_colours = other_matrix.num_colours();
        let max_colours = self.config.max_colours;

        let matrix = self.matrix.as_mut().ok_or(IndexError::NotOpen)?;
        let offset = matrix.num_colours();
        if offset + other_colours > max_colours {
            return Err(IndexError::InvalidColour(format!(
                "merged index would have {} colours, limit is {max_colours}",
                offset + other_colours
            )));
        }
        if other_colours == 0 {
            return Ok(offset);
        }

        let size = matrix.size();
        let batch = matrix.batch_size();
        let mut start = 0;
        while start < size {
            let end = (start + batch).min(size);
            let left = matrix.read_rows(start, end)?;
            let right = other_matrix.read_rows(start, end)?;
            let rows: Vec<(usize, Vec<u8>)> = left
                .into_iter()
                .zip(right)
                .enumerate()
                .filter(|(_, (_, right))| right.iter().any(|&byte| byte != 0))
                .map(|(i, (left, right))| {
                    let merged =
                        concat_rows(left, offset, &right, other_colours);
                    (start + i, merged)
                })
                .collect();
            matrix.write_rows(&rows)?;
            start = end;
        }
        matrix.grow_colours(offset + other_colours);

        for (colour, name) in other.colour_names.iter().enumerate() {
            let Some(name) = name else { continue };
            if self.colours_by_name.contains_key(name) {
                warn!(
                    name,
                    colour = offset + colour,
                    "duplicate colour name left unnamed after merge"
                );
                continue;
            }
            self.set_colour_name(offset + colour, name.clone());
        }
        self.persist_meta()?;

        info!(offset, merged = other_colours, "merged index");
        Ok(offset)
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let matrix = self.matrix()?;
        Ok(IndexStats {
            size: matrix.size(),
            num_hashes: matrix.num_hashes(),
            num_colours: matrix.num_colours(),
            named_colours: self.colours_by_name.len(),
            row_width: matrix.row_width(),
            hasher: matrix.hasher_name(),
        })
    }

    /// False positive rate of one colour's filter given its current fill.
    pub fn estimated_false_positive_rate(&self, colour: usize) -> Result<f64> {
        let matrix = self.matrix()?;
        let column = matrix.get_column(colour)?;
        Ok(estimate_false_positive_rate(
            column.count_ones(),
            matrix.size(),
            matrix.num_hashes(),
        ))
    }
}
