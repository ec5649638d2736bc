//! WGSL bodies of the sort passes
//!
//! Every pass reads its sizes from the control block written by the producing pass, so
//! none of them needs the element count from the host.

pub const SORT_COMMON: &str = r#"
const BITS_PER_PASS: u32 = 4u;
const NUM_BINS: u32 = 16u;
const SENTINEL: u32 = 0xffffffffu;

fn sort_count() -> u32 { return sort_control[0]; }
fn sort_width() -> u32 { return sort_control[1]; }
fn sort_height() -> u32 { return sort_control[2]; }
fn sort_cells() -> u32 { return sort_control[3]; }
"#;

pub const SQUARE_SYMMETRY: &str = r#"
// dst = offset + row * row_stride + col * col_stride
fn symmetry_remap(symmetry: u32, rows: u32, cols: u32, row: u32, col: u32) -> u32 {
    let r = i32(rows);
    let c = i32(cols);
    var m = vec3<i32>(0, c, 1);
    switch symmetry {
        case 1u: { m = vec3<i32>(r - 1, -1, r); }
        case 2u: { m = vec3<i32>(r * c - 1, -c, -1); }
        case 3u: { m = vec3<i32>((c - 1) * r, 1, -r); }
        case 4u: { m = vec3<i32>(c - 1, c, -1); }
        case 5u: { m = vec3<i32>((r - 1) * c, -c, 1); }
        case 6u: { m = vec3<i32>(0, 1, r); }
        case 7u: { m = vec3<i32>(c * r - 1, -1, -r); }
        default: {}
    }
    return u32(m.x + i32(row) * m.y + i32(col) * m.z);
}
"#;

/// Row-local radix sort shared by the row pass (sorts A, B is scratch) and the column
/// pass (sorts B, A is scratch)
pub const RADIX_ROW: &str = r#"
fn radix_row(base: u32, len: u32, primary_is_a: bool) {
    var in_primary = true;
    for (var digit_pass = 0u; digit_pass < 8u; digit_pass++) {
        let shift = digit_pass * BITS_PER_PASS;
        var counts: array<u32, 16>;
        for (var i = 0u; i < len; i++) {
            let key = row_key(base + i, in_primary == primary_is_a);
            counts[(key >> shift) & 0xfu] += 1u;
        }
        var trivial = false;
        for (var b = 0u; b < NUM_BINS; b++) {
            trivial = trivial || counts[b] == len;
        }
        if (trivial) { continue; }

        var offsets: array<u32, 16>;
        var running = 0u;
        for (var b = 0u; b < NUM_BINS; b++) {
            offsets[b] = running;
            running += counts[b];
        }
        for (var i = 0u; i < len; i++) {
            let from_a = in_primary == primary_is_a;
            let key = row_key(base + i, from_a);
            let value = row_value(base + i, from_a);
            let bin = (key >> shift) & 0xfu;
            row_store(base + offsets[bin], !from_a, key, value);
            offsets[bin] += 1u;
        }
        in_primary = !in_primary;
    }
    if (!in_primary) {
        for (var i = 0u; i < len; i++) {
            let from_a = !primary_is_a;
            row_store(base + i, primary_is_a, row_key(base + i, from_a), row_value(base + i, from_a));
        }
    }
}

fn row_key(index: u32, from_a: bool) -> u32 {
    if (from_a) { return keys_a[index]; }
    return keys_b[index];
}

fn row_value(index: u32, from_a: bool) -> u32 {
    if (from_a) { return values_a[index]; }
    return values_b[index];
}

fn row_store(index: u32, to_a: bool, key: u32, value: u32) {
    if (to_a) {
        keys_a[index] = key;
        values_a[index] = value;
    } else {
        keys_b[index] = key;
        values_b[index] = value;
    }
}
"#;

pub const SORTED_MATRIX_RANK: &str = r#"
// Rank of (row, col) ordered by (key, row, col) in a rows x cols sorted matrix
fn staircase_rank(rows: u32, cols: u32, row: u32, col: u32) -> u32 {
    let key = keys_b[row * cols + col];
    var rank = col;
    var p = col + 1u;
    for (var r = i32(row) - 1; r >= 0; r--) {
        while (p < cols && keys_b[u32(r) * cols + p] <= key) { p++; }
        rank += p;
    }
    var q = col;
    for (var r = row + 1u; r < rows; r++) {
        while (q > 0u && keys_b[r * cols + q - 1u] >= key) { q--; }
        rank += q;
    }
    return rank;
}
"#;

pub const SORT_FILL: &str = r#"
@compute @workgroup_size(WORKGROUP_SIZE.x)
fn sort_fill(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if (i < sort_count() || i >= sort_cells()) { return; }
    keys_a[i] = SENTINEL;
    values_a[i] = SENTINEL;
}
"#;

pub const SORT_ROWS: &str = r#"
@compute @workgroup_size(WORKGROUP_SIZE.x)
fn sort_rows(@builtin(global_invocation_id) id: vec3<u32>) {
    let row = id.x;
    if (row >= sort_height()) { return; }
    radix_row(row * sort_width(), sort_width(), true);
}
"#;

pub const SORT_ROTATE: &str = r#"
@compute @workgroup_size(WORKGROUP_SIZE.x)
fn sort_rotate(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if (i >= sort_cells()) { return; }
    let dst = symmetry_remap(u_symmetry, sort_height(), sort_width(), i / sort_width(), i % sort_width());
    keys_b[dst] = keys_a[i];
    values_b[dst] = values_a[i];
}
"#;

pub const SORT_COLUMNS: &str = r#"
@compute @workgroup_size(WORKGROUP_SIZE.x)
fn sort_columns(@builtin(global_invocation_id) id: vec3<u32>) {
    let row = id.x;
    if (row >= sort_width()) { return; }
    radix_row(row * sort_height(), sort_height(), false);
}
"#;

pub const SORT_MERGE: &str = r#"
@compute @workgroup_size(WORKGROUP_SIZE.x)
fn sort_merge(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if (i >= sort_cells()) { return; }
    let rows = sort_width();
    let cols = sort_height();
    let rank = staircase_rank(rows, cols, i / cols, i % cols);
    let n = sort_count();
    if (rank >= n) { return; }
    var pos = rank;
    if (u_descending != 0u) { pos = n - 1u - rank; }
    sorted_values[pos] = values_b[i];
}
"#;

pub const GRADE_INIT: &str = r#"
@compute @workgroup_size(WORKGROUP_SIZE.x)
fn grade_init(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if (i >= u_count) { return; }
    keys_dst[i] = grade_input[i];
    tags_dst[i] = i;
}
"#;

pub const GRADE_HISTOGRAM: &str = r#"
var<workgroup> bins: array<atomic<u32>, 16>;

// Digit-major layout: histogram[digit * blocks + block]
@compute @workgroup_size(WORKGROUP_SIZE.x)
fn grade_histogram(
    @builtin(global_invocation_id) id: vec3<u32>,
    @builtin(local_invocation_index) local: u32,
    @builtin(workgroup_id) group: vec3<u32>,
    @builtin(num_workgroups) groups: vec3<u32>,
) {
    if (local < 16u) { atomicStore(&bins[local], 0u); }
    workgroupBarrier();
    if (id.x < u_count) {
        atomicAdd(&bins[(keys_src[id.x] >> u_shift) & u_mask], 1u);
    }
    workgroupBarrier();
    if (local < 16u) {
        histogram[local * groups.x + group.x] = atomicLoad(&bins[local]);
    }
}
"#;

pub const GRADE_SCAN: &str = r#"
@compute @workgroup_size(1)
fn grade_scan() {
    var running = 0u;
    for (var i = 0u; i < u_length; i++) {
        let count = histogram[i];
        histogram[i] = running;
        running += count;
    }
}
"#;

pub const GRADE_SCATTER: &str = r#"
@compute @workgroup_size(WORKGROUP_SIZE.x)
fn grade_scatter(
    @builtin(local_invocation_index) local: u32,
    @builtin(workgroup_id) group: vec3<u32>,
    @builtin(num_workgroups) groups: vec3<u32>,
) {
    // one invocation per block walks the block in order, keeping the scatter stable
    if (local != 0u) { return; }
    var offsets: array<u32, 16>;
    for (var d = 0u; d < 16u; d++) {
        offsets[d] = histogram[d * groups.x + group.x];
    }
    let start = group.x * WORKGROUP_SIZE.x;
    let end = min(start + WORKGROUP_SIZE.x, u_count);
    for (var i = start; i < end; i++) {
        let key = keys_src[i];
        let digit = (key >> u_shift) & u_mask;
        keys_dst[offsets[digit]] = key;
        tags_dst[offsets[digit]] = tags_src[i];
        offsets[digit]++;
    }
}
"#;

pub const COPY_WORDS: &str = r#"
@compute @workgroup_size(WORKGROUP_SIZE.x)
fn copy_words(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= u_count) { return; }
    copy_dst[id.x] = copy_src[id.x];
}
"#;

pub const SELECT: &str = r#"
@compute @workgroup_size(WORKGROUP_SIZE.x)
fn select_gather(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= u_count) { return; }
    selected[id.x] = haystack[indexes[id.x]];
}
"#;
