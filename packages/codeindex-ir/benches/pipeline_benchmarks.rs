//! Pipeline benchmarks: parse → IR → BFG → CFG → expressions → DFG

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use codeindex_ir::features::data_flow::DfgBuilder;
use codeindex_ir::features::ir::IRBuilder;
use codeindex_ir::features::parsing::{parse_source, LanguageId, ParserRegistry, SourceFile, SourceMap};
use codeindex_ir::features::semantic_ir::bfg::BfgBuilder;
use codeindex_ir::features::semantic_ir::cfg::CfgBuilder;
use codeindex_ir::features::semantic_ir::expression::ExpressionBuilder;
use codeindex_ir::shared::models::IRDocument;

fn synthetic_module(functions: usize) -> String {
    let mut source = String::new();
    for i in 0..functions {
        source.push_str(&format!(
            "def handler_{i}(payload, retries):\n\
             \x20   result = payload\n\
             \x20   for attempt in range(retries):\n\
             \x20       if attempt > 0:\n\
             \x20           result = transform(result)\n\
             \x20   return result\n\n"
        ));
    }
    source
}

fn bench_pipeline(c: &mut Criterion) {
    let registry = Arc::new(ParserRegistry::with_defaults());
    let code = synthetic_module(50);

    c.bench_function("parse_50_functions", |b| {
        b.iter(|| {
            let source = SourceFile::new("bench.py", LanguageId::Python, code.clone());
            black_box(parse_source(&source).unwrap())
        })
    });

    let source = SourceFile::new("bench.py", LanguageId::Python, code.clone());
    let parsed = parse_source(&source).unwrap();
    let ir_builder = IRBuilder::new(registry.clone());

    c.bench_function("ir_build_50_functions", |b| {
        b.iter(|| black_box(ir_builder.build_file(&parsed, "bench").unwrap()))
    });

    let mut doc = IRDocument::new("bench", "main");
    doc.merge(ir_builder.build_file(&parsed, "bench").unwrap());
    let mut source_map = SourceMap::new();
    source_map.insert("bench.py".to_string(), parsed);

    let bfg_builder = BfgBuilder::new(registry);
    c.bench_function("bfg_cfg_50_functions", |b| {
        b.iter(|| {
            let bfg = bfg_builder.build_full(&doc, &source_map);
            black_box(CfgBuilder::new().build_from_bfg(&bfg.graphs).unwrap())
        })
    });

    let bfg = bfg_builder.build_full(&doc, &source_map);
    let expressions = ExpressionBuilder::new().build_full(&doc, &bfg.graphs, &source_map);

    c.bench_function("dfg_50_functions", |b| {
        b.iter(|| {
            let mut dfg_builder = DfgBuilder::new();
            black_box(dfg_builder.build_full(&doc, &bfg.blocks, &expressions))
        })
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
