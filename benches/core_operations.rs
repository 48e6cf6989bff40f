use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use govm::api::parse_index;
use govm::module::escape_module_path;
use govm::resolve::Resolver;
use govm::version::compare_versions;
use govm::{InstallSource, InstalledVersion};
use std::path::PathBuf;

fn bench_compare_versions(c: &mut Criterion) {
    let mut tags: Vec<String> = (0..24)
        .flat_map(|minor| {
            let mut v: Vec<String> = (0..12).map(|patch| format!("1.{}.{}", minor, patch)).collect();
            v.push(format!("1.{}rc1", minor));
            v.push(format!("1.{}beta2", minor));
            v
        })
        .collect();
    tags.reverse();

    c.bench_function("sort release tags", |b| {
        b.iter(|| {
            let mut sorted = tags.clone();
            sorted.sort_by(|a, b| compare_versions(black_box(a), black_box(b)));
            sorted
        })
    });
}

fn installed(count: usize) -> Vec<InstalledVersion> {
    (0..count)
        .map(|i| InstalledVersion {
            version: format!("1.{}.{}", i / 10, i % 10),
            path: PathBuf::from(format!("/home/dev/.govm/versions/1.{}.{}", i / 10, i % 10)),
            installed_at: None,
            size: 0,
            source: InstallSource::Managed,
            is_current: false,
        })
        .collect()
}

fn bench_resolver(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    let resolver = Resolver::default();

    for count in [5, 50, 200] {
        let versions = installed(count);
        let last = versions[count - 1].version.clone();

        group.bench_with_input(BenchmarkId::new("exact_tag", count), &versions, |b, v| {
            b.iter(|| resolver.resolve(black_box(&last), v).map(|hit| hit.path.clone()))
        });
        group.bench_with_input(BenchmarkId::new("not_found", count), &versions, |b, v| {
            b.iter(|| resolver.resolve(black_box("9.9.9"), v).is_err())
        });
    }

    group.finish();
}

fn bench_escape_module_path(c: &mut Criterion) {
    let paths = [
        "github.com/BurntSushi/toml",
        "golang.org/x/text",
        "github.com/Azure/azure-sdk-for-go/sdk/azcore",
        "gopkg.in/yaml.v3",
    ];

    c.bench_function("escape_module_path", |b| {
        b.iter(|| {
            for path in &paths {
                let _ = escape_module_path(black_box(path));
            }
        })
    });
}

fn bench_parse_index(c: &mut Criterion) {
    let entries: Vec<String> = (0..300)
        .map(|i| {
            format!(
                r#"{{"version":"go1.{}.{}","stable":true,"files":[{{"filename":"go1.{}.{}.linux-amd64.tar.gz","os":"linux","arch":"amd64","sha256":"{}","size":68000000,"kind":"archive"}}]}}"#,
                i / 12,
                i % 12,
                i / 12,
                i % 12,
                "ab".repeat(32)
            )
        })
        .collect();
    let body = format!("[{}]", entries.join(","));

    c.bench_function("parse release index", |b| {
        b.iter(|| parse_index(black_box(&body)).map(|v| v.len()))
    });
}

criterion_group!(
    benches,
    bench_compare_versions,
    bench_resolver,
    bench_escape_module_path,
    bench_parse_index
);
criterion_main!(benches);
