use crate::inference::schema::{FieldKind, Schema};

/// Sequential writer over an optional destination. Without a destination it only counts.
struct VectorWriter<'a> {
    out: Option<&'a mut [f32]>,
    offset: usize,
}

impl<'a> VectorWriter<'a> {
    fn reserve(&mut self, count: usize) -> Option<&mut [f32]> {
        let start = self.offset;
        self.offset += count;
        match self.out.as_deref_mut() {
            None => None,
            Some(buf) => {
                if self.offset > buf.len() {
                    panic!(
                        "feature vector overflow: {} slots at offset {} exceed capacity {}",
                        count,
                        start,
                        buf.len()
                    );
                }
                Some(&mut buf[start..self.offset])
            }
        }
    }

    fn insert(&mut self, value: f32) {
        if let Some(slot) = self.reserve(1) {
            slot[0] = value;
        }
    }

    fn one_hot(&mut self, position: usize, width: usize) {
        if let Some(block) = self.reserve(width) {
            block.fill(0.0);
            block[position] = 1.0;
        }
    }

    fn zeros(&mut self, count: usize) {
        if let Some(block) = self.reserve(count) {
            block.fill(0.0);
        }
    }
}

/// Serializes items of type `T` through a registered [`Schema`].
#[derive(Debug)]
pub struct Encoder<T> {
    schema: Schema<T>,
}

impl<T> Encoder<T> {
    pub fn new(schema: Schema<T>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema<T> {
        &self.schema
    }

    pub fn width(&self) -> usize {
        self.schema.width()
    }

    /// Number of slots [`Self::encode`] would write, without writing.
    pub fn simulate(&self, item: &T) -> usize {
        self.run(item, VectorWriter { out: None, offset: 0 })
    }

    /// Writes the descriptor at the start of `out` and returns the number of slots written.
    ///
    /// # Panics
    /// When `out` is too small or an enum value has no slot in the schema. Both are
    /// schema/caller mismatches, not properties of the workload.
    pub fn encode(&self, item: &T, out: &mut [f32]) -> usize {
        self.run(item, VectorWriter { out: Some(out), offset: 0 })
    }

    pub fn encode_vec(&self, item: &T) -> Vec<f32> {
        let mut out = vec![0.0; self.width()];
        self.encode(item, &mut out);
        out
    }

    fn run(&self, item: &T, mut writer: VectorWriter<'_>) -> usize {
        let counting = writer.out.is_none();
        for field in self.schema.fields() {
            match &field.kind {
                FieldKind::Scalar(get) => {
                    let value = if counting { 0.0 } else { get(item) };
                    writer.insert(value);
                }
                FieldKind::OneHot { map, index } => {
                    if counting {
                        writer.zeros(map.width());
                        continue;
                    }
                    let idx = index(item);
                    let Some(position) = map.position(idx) else {
                        panic!(
                            "{} value #{} has no slot in field '{}' of schema '{}'",
                            map.domain(),
                            idx,
                            field.name,
                            self.schema.name()
                        );
                    };
                    writer.one_hot(position, map.width());
                }
                FieldKind::Padding(n) => writer.zeros(*n),
            }
        }
        writer.offset
    }
}
