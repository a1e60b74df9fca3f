mod alac;
