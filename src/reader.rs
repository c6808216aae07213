//! The read-side engine: a state machine turning a byte stream into an
//! object graph.
//!
//! Parsing is single-threaded and purely synchronous; the only "concurrency"
//! is recursion — nested objects, nested pool entries, and external-file loads
//! that happen inline on the calling thread. Stack depth therefore grows with
//! the combined depth of the graph and the chain of external references, and
//! no cross-file cycle detection is performed.
//!
//! The state machine peeks a one-byte command and only consumes it once the
//! handler commits: header validation, then a top-level loop over
//! object/static-data commands, with `read_object` recursing for children and
//! pool entries. Every multi-byte container primitive is decoded with the
//! endianness declared in the header; opaque cell payloads are copied
//! verbatim.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use memmap2::Mmap;

use crate::compression::CompressorRegistry;
use crate::error::{FbomError, Result};
use crate::format::{
    DataLocation, FbomCommand, FbomDataFlags, PoolKind, StringKind, unpack_string_header,
    HEADER_SIZE, MAGIC_BYTES, STATIC_DATA_RESERVED,
};
use crate::names::{NameId, NameRegistry, NameTable};
use crate::object::{ExternalRef, FbomObject, MarshalerRegistry, NativeHandle};
use crate::pool::{PoolValue, StaticDataPool};
use crate::stream::{ByteReader, Endianness};
use crate::typed::{FbomType, NativeTypeId, TypeSize};
use crate::value::FbomData;
use crate::version::{FbomVersion, CURRENT_VERSION};

/// Key of the external-reference cache: resolved path plus object index.
pub type ExternalKey = (PathBuf, u32);

/// Session configuration shared by a reader and every reader it spawns for
/// external references.
///
/// Cloning is cheap and shares the external-reference cache, the marshaler
/// and compressor registries, and the name registry. Sharing one config
/// across readers is what gives "one underlying load per `(path, index)`".
#[derive(Debug, Clone)]
pub struct FbomConfig {
    /// Base path external file references are resolved against.
    pub base_path: PathBuf,
    /// Best-effort mode: keep a placeholder node when an external file fails
    /// to load instead of aborting the read.
    pub continue_on_external_load_error: bool,
    /// Opt-in strict mode: cross-validate the unique id read at a static
    /// reference site against the pooled object's id.
    pub strict_unique_ids: bool,
    /// Cache of already-resolved external references. No eviction; lives as
    /// long as the config.
    pub external_cache: Arc<Mutex<HashMap<ExternalKey, FbomObject>>>,
    /// Marshalers consulted by the object-completion hook.
    pub marshalers: Arc<MarshalerRegistry>,
    /// The process-wide name-interning registry.
    pub names: Arc<NameRegistry>,
    /// Compression backends for flagged-compressed cells.
    pub compressors: Arc<CompressorRegistry>,
}

impl Default for FbomConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::new(),
            continue_on_external_load_error: false,
            strict_unique_ids: false,
            external_cache: Arc::new(Mutex::new(HashMap::new())),
            marshalers: Arc::new(MarshalerRegistry::new()),
            names: Arc::new(NameRegistry::new()),
            compressors: Arc::new(CompressorRegistry::new()),
        }
    }
}

impl FbomConfig {
    /// Creates a default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base path for external references.
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = path.into();
        self
    }

    /// Enables best-effort handling of external load failures.
    pub fn tolerate_external_failures(mut self) -> Self {
        self.continue_on_external_load_error = true;
        self
    }

    /// Enables strict unique-id validation at static reference sites.
    pub fn with_strict_unique_ids(mut self) -> Self {
        self.strict_unique_ids = true;
        self
    }

    /// Installs a marshaler registry.
    pub fn with_marshalers(mut self, marshalers: Arc<MarshalerRegistry>) -> Self {
        self.marshalers = marshalers;
        self
    }
}

/// The main handle for decoding FBOM streams.
#[derive(Debug, Default)]
pub struct FbomReader {
    config: FbomConfig,
}

impl FbomReader {
    /// Creates a reader with a default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a reader sharing the given session configuration.
    pub fn with_config(config: FbomConfig) -> Self {
        Self { config }
    }

    /// The session configuration.
    pub fn config(&self) -> &FbomConfig {
        &self.config
    }

    /// Decodes a complete stream into its single root object.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<FbomObject> {
        parse_stream(bytes, &self.config).map(|parsed| parsed.root)
    }

    /// Explicitly invokes the registered marshaler for a node's type.
    ///
    /// # Errors
    /// [`FbomError::Type`] when no marshaler is registered for the type name,
    /// in contrast to the implicit completion hook where absence is fine.
    pub fn deserialize_native(&self, node: &FbomObject) -> Result<NativeHandle> {
        let name = &node.ty().name;
        let loader = self.config.marshalers.get_loader(name).ok_or_else(|| {
            FbomError::Type(format!("No marshaler registered for type \"{name}\""))
        })?;
        loader.deserialize(node)
    }

    /// Memory-maps a file and decodes it.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<FbomObject> {
        let file = File::open(path)?;
        if file.metadata()?.len() < HEADER_SIZE as u64 {
            return Err(FbomError::Format("File smaller than header".into()));
        }

        // Safety: mapping is fundamentally unsafe as external processes could
        // modify the file underneath us. We assume exclusive access, same as
        // any memory-mapped reader.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };

        self.deserialize(&mmap)
    }
}

/// A fully parsed stream, including the populated static pool.
/// Used by the inspector; ordinary callers only see the root.
pub(crate) struct ParsedStream {
    pub(crate) root: FbomObject,
    pub(crate) pool: StaticDataPool,
    pub(crate) endianness: Endianness,
    pub(crate) version: FbomVersion,
}

pub(crate) fn parse_stream(bytes: &[u8], config: &FbomConfig) -> Result<ParsedStream> {
    let mut session = ReadSession::new(bytes, config);
    session.run()
}

/// Decodes the self-contained payload of an embedded object cell.
pub(crate) fn deserialize_object_payload(bytes: &[u8], config: &FbomConfig) -> Result<FbomObject> {
    FbomReader::with_config(config.clone()).deserialize(bytes)
}

/// Decodes the self-contained payload of an embedded array cell.
pub(crate) fn deserialize_array_payload(
    bytes: &[u8],
    config: &FbomConfig,
) -> Result<Vec<FbomData>> {
    let mut session = ReadSession::new(bytes, config);
    let count = session.r.read_u32()? as usize;
    // Same bound as the static block: the smallest cell encoding is the
    // five-byte [u8 location][u32 offset] pool reference.
    if count > session.r.remaining() / 5 {
        return Err(FbomError::Format(format!(
            "Declared array count {count} cannot fit in the {} remaining bytes",
            session.r.remaining()
        )));
    }
    let mut cells = Vec::with_capacity(count);
    for _ in 0..count {
        cells.push(session.read_cell()?);
    }
    Ok(cells)
}

/// One in-flight decode over one byte slice.
struct ReadSession<'a, 'c> {
    r: ByteReader<'a>,
    config: &'c FbomConfig,
    pool: StaticDataPool,
    in_static_block: bool,
    version: FbomVersion,
}

impl<'a, 'c> ReadSession<'a, 'c> {
    fn new(bytes: &'a [u8], config: &'c FbomConfig) -> Self {
        Self {
            r: ByteReader::new(bytes),
            config,
            pool: StaticDataPool::default(),
            in_static_block: false,
            version: CURRENT_VERSION,
        }
    }

    // --- HEADER ---

    fn read_header(&mut self) -> Result<()> {
        let magic = self.r.read_bytes(MAGIC_BYTES.len())?;
        if magic != MAGIC_BYTES {
            return Err(FbomError::Format(format!(
                "Invalid magic bytes: {magic:02x?}"
            )));
        }

        let endianness = Endianness::from_flag(self.r.read_u8()?)?;
        self.r.set_endianness(endianness);

        let version = FbomVersion::from_u32(self.r.read_u32()?);
        if FbomVersion::test_compatibility(version, CURRENT_VERSION) != 0 {
            return Err(FbomError::Version(format!(
                "Stream version {version} is incompatible with {CURRENT_VERSION}"
            )));
        }
        self.version = version;
        Ok(())
    }

    // --- TOP LEVEL ---

    fn run(&mut self) -> Result<ParsedStream> {
        self.read_header()?;

        // Roots accumulate under a synthetic container; exactly one must
        // remain when the stream ends.
        let mut roots: Vec<FbomObject> = Vec::new();

        while self.r.remaining() > 0 {
            match FbomCommand::from_u8(self.r.peek_u8()?)? {
                FbomCommand::ObjectStart => roots.push(self.read_object()?),
                FbomCommand::StaticDataStart => self.read_static_block()?,
                FbomCommand::StaticDataEnd => {
                    if !self.in_static_block {
                        return Err(FbomError::Format(
                            "StaticDataEnd outside a static-data block".into(),
                        ));
                    }
                    self.r.read_u8()?;
                    self.in_static_block = false;
                }
                other => {
                    return Err(FbomError::Format(format!(
                        "Unexpected command at top level: {other:?}"
                    )));
                }
            }
        }

        if self.in_static_block {
            return Err(FbomError::Format("Unterminated static-data block".into()));
        }
        if roots.len() != 1 {
            return Err(FbomError::Format(format!(
                "Expected exactly one root object, found {}",
                roots.len()
            )));
        }

        // len() == 1 checked above.
        let root = roots.remove(0);
        Ok(ParsedStream {
            root,
            pool: std::mem::take(&mut self.pool),
            endianness: self.r.endianness(),
            version: self.version,
        })
    }

    // --- STATIC DATA ---

    fn read_static_block(&mut self) -> Result<()> {
        if self.in_static_block {
            return Err(FbomError::Format(
                "Static-data blocks cannot nest".into(),
            ));
        }
        self.r.read_u8()?; // StaticDataStart
        self.in_static_block = true;

        let count = self.r.read_u32()? as usize;
        self.r.read_bytes(STATIC_DATA_RESERVED)?;
        // The count comes from the stream; bound it by what could possibly
        // follow (each entry is at least [u32 offset][u8 kind]) before
        // allocating anything.
        if count > self.r.remaining() / 5 {
            return Err(FbomError::Format(format!(
                "Declared pool count {count} cannot fit in the {} remaining bytes",
                self.r.remaining()
            )));
        }
        self.pool = StaticDataPool::with_capacity(count);

        for _ in 0..count {
            let offset = self.r.read_u32()?;
            self.pool.check_bounds(offset)?;
            match PoolKind::from_u8(self.r.read_u8()?)? {
                PoolKind::None => {}
                PoolKind::Type => {
                    let ty = self.read_type_inline()?;
                    self.pool.put(offset, PoolValue::Type(ty))?;
                }
                PoolKind::Data => {
                    // The cell body may reference earlier slots itself.
                    let cell = self.read_cell_body()?;
                    self.pool.put(offset, PoolValue::Data(cell))?;
                }
                PoolKind::Object => {
                    let node = self.read_object()?;
                    self.pool.put(offset, PoolValue::Object(node))?;
                }
                PoolKind::NameTable => {
                    let table = self.read_name_table_inline()?;
                    table.register_all(&self.config.names);
                    self.pool.put(offset, PoolValue::NameTable(table))?;
                }
            }
        }
        Ok(())
    }

    // --- OBJECTS ---

    fn read_object(&mut self) -> Result<FbomObject> {
        let marker = self.r.read_u8()?;
        if FbomCommand::from_u8(marker)? != FbomCommand::ObjectStart {
            return Err(FbomError::Format(format!(
                "Expected ObjectStart, found 0x{marker:02x}"
            )));
        }

        let unique_id = self.r.read_u64()?;

        match DataLocation::from_u8(self.r.read_u8()?)? {
            DataLocation::InPlace => self.read_object_in_place(unique_id),
            DataLocation::Static => {
                let offset = self.r.read_u32()?;
                let node = self.pool.get_object(offset)?.clone();
                if self.config.strict_unique_ids && node.unique_id() != unique_id {
                    return Err(FbomError::Invariant(format!(
                        "Static object at slot {offset} has id {}, reference site read {unique_id}",
                        node.unique_id()
                    )));
                }
                Ok(node)
            }
            DataLocation::ExtRef => {
                let file = self.read_string()?;
                let index = self.r.read_u32()?;
                let flags = self.r.read_u32()?;
                self.resolve_external(file, index, flags)
            }
            DataLocation::None => Err(FbomError::Format(
                "Object carries no data location".into(),
            )),
        }
    }

    fn read_object_in_place(&mut self, unique_id: u64) -> Result<FbomObject> {
        let ty = self.read_type_ref()?;
        let mut node = FbomObject::with_unique_id(ty, unique_id);

        loop {
            match FbomCommand::from_u8(self.r.peek_u8()?)? {
                FbomCommand::ObjectStart => {
                    let child = self.read_object()?;
                    node.add_child(child);
                }
                FbomCommand::DefineProperty => {
                    self.r.read_u8()?;
                    let name = self.read_cell()?.as_name()?;
                    let value = self.read_cell()?;
                    node.set_property(name, value);
                }
                FbomCommand::ObjectEnd => {
                    self.r.read_u8()?;
                    break;
                }
                other => {
                    return Err(FbomError::Format(format!(
                        "Unexpected command inside object body: {other:?}"
                    )));
                }
            }
        }

        self.finish_object(&mut node)?;
        Ok(node)
    }

    /// Completion hook: runs the registered marshaler, if any, immediately
    /// after the closing marker. No marshaler means the node stays a plain
    /// data tree.
    fn finish_object(&self, node: &mut FbomObject) -> Result<()> {
        if let Some(loader) = self.config.marshalers.get_loader(&node.ty().name) {
            let handle = loader.deserialize(node)?;
            node.set_deserialized(handle);
        }
        Ok(())
    }

    // --- EXTERNAL REFERENCES ---

    fn resolve_external(&mut self, file: String, index: u32, flags: u32) -> Result<FbomObject> {
        let resolved = self.config.base_path.join(&file);
        let key: ExternalKey = (resolved.clone(), index);

        {
            let cache = self.lock_cache()?;
            if let Some(node) = cache.get(&key) {
                return Ok(node.clone());
            }
        }

        // Object indices other than 0 are reserved for multi-object library
        // files; every index currently resolves to the file's root object.
        let loaded = FbomReader::with_config(self.config.clone())
            .load_from_file(&resolved)
            .map_err(|e| {
                FbomError::Reference(format!("Failed to load {}: {e}", resolved.display()))
            });

        let node = match loaded {
            Ok(node) => node,
            Err(err) => {
                if !self.config.continue_on_external_load_error {
                    return Err(err);
                }
                // Best-effort mode: a placeholder that still names what it
                // stands for.
                let mut placeholder = FbomObject::with_unique_id(FbomType::unset(), 0);
                placeholder.set_external(ExternalRef { file, index, flags });
                placeholder
            }
        };

        let mut cache = self.lock_cache()?;
        cache.insert(key, node.clone());
        Ok(node)
    }

    fn lock_cache(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<ExternalKey, FbomObject>>> {
        self.config
            .external_cache
            .lock()
            .map_err(|_| FbomError::Invariant("External-reference cache mutex poisoned".into()))
    }

    // --- TYPES ---

    fn read_type_ref(&mut self) -> Result<FbomType> {
        match DataLocation::from_u8(self.r.read_u8()?)? {
            DataLocation::InPlace => self.read_type_inline(),
            DataLocation::Static => {
                let offset = self.r.read_u32()?;
                Ok(self.pool.get_type(offset)?.clone())
            }
            other => Err(FbomError::Format(format!(
                "Invalid data location for a type: {other:?}"
            ))),
        }
    }

    fn read_type_inline(&mut self) -> Result<FbomType> {
        let parent = match self.r.read_u8()? {
            0 => None,
            1 => Some(Arc::new(self.read_type_inline()?)),
            other => {
                return Err(FbomError::Format(format!(
                    "Invalid parent-present flag: 0x{other:02x}"
                )));
            }
        };

        let name = self.read_string()?;
        let size = TypeSize::from_wire(self.r.read_u64()?);
        let native = match self.r.read_u8()? {
            0 => None,
            1 => Some(NativeTypeId::new(self.r.read_u64()?)),
            other => {
                return Err(FbomError::Format(format!(
                    "Invalid native-id flag: 0x{other:02x}"
                )));
            }
        };

        Ok(FbomType {
            name,
            size,
            native,
            parent,
        })
    }

    // --- DATA CELLS ---

    fn read_cell(&mut self) -> Result<FbomData> {
        match DataLocation::from_u8(self.r.read_u8()?)? {
            DataLocation::InPlace => self.read_cell_body(),
            DataLocation::Static => {
                let offset = self.r.read_u32()?;
                Ok(self.pool.get_data(offset)?.clone())
            }
            other => Err(FbomError::Format(format!(
                "Invalid data location for a cell: {other:?}"
            ))),
        }
    }

    fn read_cell_body(&mut self) -> Result<FbomData> {
        let ty = self.read_type_ref()?;
        let raw_flags = self.r.read_u32()?;
        let flags = FbomDataFlags::from_bits(raw_flags).ok_or_else(|| {
            FbomError::Format(format!("Unknown data flags: 0x{raw_flags:08x}"))
        })?;
        let len = self.r.read_u32()? as usize;
        // Opaque payload: copied verbatim, never byte-swapped.
        let bytes = self.r.read_bytes(len)?.to_vec();
        Ok(FbomData::new(ty, bytes, flags))
    }

    // --- STRINGS / NAME TABLES ---

    fn read_string(&mut self) -> Result<String> {
        let (len, kind) = unpack_string_header(self.r.read_u32()?)?;
        if kind != StringKind::Utf8 {
            return Err(FbomError::Type(format!(
                "Expected a UTF-8 string, found kind {kind:?}"
            )));
        }
        let bytes = self.r.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| FbomError::Type(format!("Invalid UTF-8 in string: {e}")))
    }

    fn read_name_table_inline(&mut self) -> Result<NameTable> {
        let count = self.r.read_u32()?;
        let mut table = NameTable::new();
        for _ in 0..count {
            let text = self.read_string()?;
            let id = NameId::from_raw(self.r.read_u64()?);
            table.insert_checked(text, id)?;
        }
        Ok(table)
    }
}
