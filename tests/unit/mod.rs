mod graph_memory;
